//! Naming of downloaded generation results.

use montage_storage::generated_key;
use uuid::Uuid;

/// Storage extension and content type for a result file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultFile {
    pub extension: &'static str,
    pub content_type: &'static str,
}

const MP4: ResultFile = ResultFile {
    extension: ".mp4",
    content_type: "video/mp4",
};
const JPEG: ResultFile = ResultFile {
    extension: ".jpg",
    content_type: "image/jpeg",
};
const PNG: ResultFile = ResultFile {
    extension: ".png",
    content_type: "image/png",
};

/// Infer the stored file type from a result URL's path. Unknown suffixes store as JPEG.
pub fn infer_result_file(url: &str) -> ResultFile {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_lowercase();

    if path.ends_with(".mp4") {
        MP4
    } else if path.ends_with(".png") {
        PNG
    } else {
        JPEG
    }
}

/// Fresh storage key under the generated prefix.
pub fn unique_result_key(file: ResultFile) -> String {
    generated_key(&Uuid::new_v4().simple().to_string(), file.extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_from_suffix() {
        assert_eq!(infer_result_file("https://cdn/a/b.mp4"), MP4);
        assert_eq!(infer_result_file("https://cdn/a/b.JPEG"), JPEG);
        assert_eq!(infer_result_file("https://cdn/a/b.jpg"), JPEG);
        assert_eq!(infer_result_file("https://cdn/a/b.png"), PNG);
        assert_eq!(infer_result_file("https://cdn/a/b.webp"), JPEG);
        assert_eq!(infer_result_file("https://cdn/a/b"), JPEG);
    }

    #[test]
    fn ignores_query_and_fragment() {
        assert_eq!(infer_result_file("https://cdn/x.mp4?sig=abc.png"), MP4);
        assert_eq!(infer_result_file("https://cdn/x.png#frag.mp4"), PNG);
    }

    #[test]
    fn keys_are_unique_and_prefixed() {
        let a = unique_result_key(MP4);
        let b = unique_result_key(MP4);
        assert_ne!(a, b);
        assert!(a.starts_with("generated/"));
        assert!(a.ends_with(".mp4"));
        assert_eq!(a.len(), "generated/".len() + 32 + ".mp4".len());
    }
}
