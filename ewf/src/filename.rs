//! Segment filename sequencing
//!
//! A container larger than one segment file continues in files named by a
//! three-character serial suffix: `.E01` through `.E99`, then `.EAA`
//! through `.EZZ` and onward with carry into the leading character.

use std::path::{Path, PathBuf};

use crate::error::{EwfError, Result};

/// Returns the filename of the segment file that follows `path` in the
/// serial naming sequence.
pub fn next_segment_path(path: &Path) -> Result<PathBuf> {
    let text = path.to_str().ok_or_else(|| EwfError::Sequence {
        path: path.to_path_buf(),
        reason: "segment filename is not valid UTF-8".to_string(),
    })?;

    let bytes = text.as_bytes();
    let len = bytes.len();
    if len < 4 || bytes[len - 4] != b'.' || !bytes[len - 3..].iter().all(|byte| byte.is_ascii()) {
        return Err(EwfError::Sequence {
            path: path.to_path_buf(),
            reason: "segment filename lacks a 3-character serial suffix".to_string(),
        });
    }

    let mut suffix = [bytes[len - 3], bytes[len - 2], bytes[len - 1]];
    if suffix == *b"E99" {
        // numeric range ends at E99 and continues at EAA
        suffix = *b"EAA";
    } else if suffix[1].is_ascii_digit() {
        if suffix[2] == b'9' {
            suffix[2] = b'0';
            suffix[1] += 1;
        } else {
            suffix[2] += 1;
        }
    } else {
        suffix[2] += 1;
        if suffix[2] == b'[' {
            // '[' follows 'Z', so carry into the next position
            suffix[2] = b'A';
            suffix[1] += 1;
            if suffix[1] == b'[' {
                suffix[1] = b'A';
                suffix[0] += 1;
            }
        }
    }

    let mut next = String::with_capacity(len);
    next.push_str(&text[..len - 3]);
    for byte in suffix {
        next.push(char::from(byte));
    }
    Ok(PathBuf::from(next))
}

/// Whether `path` carries the suffix designating the first segment file of
/// a container.
pub fn is_first_segment_path(path: &Path) -> bool {
    let Some(text) = path.to_str() else {
        return false;
    };
    let bytes = text.as_bytes();
    let len = bytes.len();
    len >= 4 && bytes[len - 4] == b'.' && bytes[len - 3..] == *b"E01"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_numeric_suffixes() {
        let next = next_segment_path(Path::new("image.E01")).expect("should increment");
        assert_eq!(next, Path::new("image.E02"));

        let next = next_segment_path(Path::new("image.E09")).expect("should increment");
        assert_eq!(next, Path::new("image.E10"));

        let next = next_segment_path(Path::new("/case/image.E41")).expect("should increment");
        assert_eq!(next, Path::new("/case/image.E42"));
    }

    #[test]
    fn crosses_from_digits_into_letters() {
        let next = next_segment_path(Path::new("image.E99")).expect("should increment");
        assert_eq!(next, Path::new("image.EAA"));
    }

    #[test]
    fn increments_letter_suffixes_with_carry() {
        let next = next_segment_path(Path::new("image.EAA")).expect("should increment");
        assert_eq!(next, Path::new("image.EAB"));

        let next = next_segment_path(Path::new("image.EAZ")).expect("should increment");
        assert_eq!(next, Path::new("image.EBA"));

        let next = next_segment_path(Path::new("image.EZZ")).expect("should increment");
        assert_eq!(next, Path::new("image.FAA"));
    }

    #[test]
    fn rejects_names_without_suffix() {
        assert!(next_segment_path(Path::new("image")).is_err());
        assert!(next_segment_path(Path::new("imageE01")).is_err());
        assert!(next_segment_path(Path::new(".E0")).is_err());
        assert!(next_segment_path(Path::new("image.é1")).is_err());
    }

    #[test]
    fn recognizes_first_segment_names() {
        assert!(is_first_segment_path(Path::new("image.E01")));
        assert!(is_first_segment_path(Path::new("/case/image.E01")));
        assert!(!is_first_segment_path(Path::new("image.E02")));
        assert!(!is_first_segment_path(Path::new("image.e01")));
        assert!(!is_first_segment_path(Path::new("image")));
    }
}
