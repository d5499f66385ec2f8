//! MP3 segment stitching.
//!
//! MPEG audio is a sequence of self-synchronising frames, so back-to-back
//! MP3 files already form a playable stream. The only parts that do not
//! belong mid-stream are the metadata tags each speech request wraps its
//! audio in: a leading ID3v2 tag and a trailing 128-byte ID3v1 tag. Players
//! either skip them or emit a click, so they are removed at segment
//! boundaries:
//!
//! * segments after the first lose their leading ID3v2 tag
//! * segments before the last lose their trailing ID3v1 tag
//!
//! The first segment's ID3v2 tag and the last segment's ID3v1 tag describe
//! the whole narration and are kept.

const ID3V2_HEADER_LEN: usize = 10;
const ID3V2_FOOTER_FLAG: u8 = 0x10;
const ID3V1_LEN: usize = 128;

/// Encoded audio for one synthesised chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    /// Index of the text chunk this audio was produced from.
    pub index: usize,
    pub bytes: Vec<u8>,
}

/// Concatenate segments in index order into one MP3 stream.
pub fn stitch_mp3(mut segments: Vec<AudioSegment>) -> Vec<u8> {
    segments.sort_by_key(|s| s.index);
    let last = segments.len().saturating_sub(1);
    let capacity = segments.iter().map(|s| s.bytes.len()).sum();
    let mut out = Vec::with_capacity(capacity);

    for (pos, segment) in segments.iter().enumerate() {
        let mut body = segment.bytes.as_slice();
        if pos > 0 {
            body = &body[id3v2_len(body)..];
        }
        if pos < last {
            body = strip_id3v1(body);
        }
        out.extend_from_slice(body);
    }
    out
}

/// Total length of a leading ID3v2 tag, or 0 if there is none.
///
/// Sizes that run past the end of the buffer are treated as "no tag" so a
/// corrupt header never swallows audio.
fn id3v2_len(data: &[u8]) -> usize {
    if data.len() < ID3V2_HEADER_LEN || &data[..3] != b"ID3" {
        return 0;
    }
    let size_bytes = &data[6..10];
    if size_bytes.iter().any(|b| b & 0x80 != 0) {
        return 0;
    }
    // Syncsafe integer: 7 significant bits per byte.
    let size = size_bytes
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | usize::from(*b));
    let footer = if data[5] & ID3V2_FOOTER_FLAG != 0 {
        ID3V2_HEADER_LEN
    } else {
        0
    };
    let total = ID3V2_HEADER_LEN + size + footer;
    if total > data.len() {
        0
    } else {
        total
    }
}

fn strip_id3v1(data: &[u8]) -> &[u8] {
    if data.len() >= ID3V1_LEN && &data[data.len() - ID3V1_LEN..][..3] == b"TAG" {
        &data[..data.len() - ID3V1_LEN]
    } else {
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id3v2(payload: &[u8]) -> Vec<u8> {
        let n = payload.len();
        let mut tag = b"ID3\x04\x00\x00".to_vec();
        tag.extend_from_slice(&[
            ((n >> 21) & 0x7f) as u8,
            ((n >> 14) & 0x7f) as u8,
            ((n >> 7) & 0x7f) as u8,
            (n & 0x7f) as u8,
        ]);
        tag.extend_from_slice(payload);
        tag
    }

    fn id3v1() -> Vec<u8> {
        let mut tag = b"TAG".to_vec();
        tag.resize(ID3V1_LEN, b' ');
        tag
    }

    fn segment(index: usize, frames: &[u8]) -> AudioSegment {
        let mut bytes = id3v2(b"TSSE-lavf");
        bytes.extend_from_slice(frames);
        bytes.extend_from_slice(&id3v1());
        AudioSegment { index, bytes }
    }

    #[test]
    fn single_segment_is_untouched() {
        let seg = segment(0, b"\xff\xfbAAAA");
        assert_eq!(stitch_mp3(vec![seg.clone()]), seg.bytes);
    }

    #[test]
    fn inner_tags_are_removed() {
        let out = stitch_mp3(vec![segment(0, b"\xff\xfbAAAA"), segment(1, b"\xff\xfbBBBB")]);

        let mut expected = id3v2(b"TSSE-lavf");
        expected.extend_from_slice(b"\xff\xfbAAAA\xff\xfbBBBB");
        expected.extend_from_slice(&id3v1());
        assert_eq!(out, expected);
    }

    #[test]
    fn segments_are_ordered_by_index() {
        let raw = |index, b: &[u8]| AudioSegment { index, bytes: b.to_vec() };
        let out = stitch_mp3(vec![raw(2, b"C"), raw(0, b"A"), raw(1, b"B")]);
        assert_eq!(out, b"ABC");
    }

    #[test]
    fn untagged_audio_is_concatenated_verbatim() {
        let raw = |index, b: &[u8]| AudioSegment { index, bytes: b.to_vec() };
        assert_eq!(stitch_mp3(vec![raw(0, b"\xff\xfb12"), raw(1, b"\xff\xfb34")]), b"\xff\xfb12\xff\xfb34");
    }

    #[test]
    fn truncated_id3v2_header_is_kept() {
        // Claims a 127-byte body but only 3 bytes follow.
        let bogus = b"ID3\x04\x00\x00\x00\x00\x00\x7fxyz".to_vec();
        assert_eq!(id3v2_len(&bogus), 0);
    }

    #[test]
    fn footer_flag_extends_tag() {
        let mut tag = id3v2(b"abc");
        tag[5] = ID3V2_FOOTER_FLAG;
        tag.extend_from_slice(b"3DI\x04\x00\x10\x00\x00\x00\x03");
        tag.extend_from_slice(b"\xff\xfb");
        assert_eq!(id3v2_len(&tag), 10 + 3 + 10);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(stitch_mp3(Vec::new()).is_empty());
    }
}
