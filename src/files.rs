use std::{fs, path::Path};

use crate::error::AssertError;

const RECOGNIZED_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

/// Reads a prompt or instruction file, accepting only plain-text formats.
pub fn load_text(path: impl AsRef<Path>) -> Result<String, AssertError> {
    let path = path.as_ref();

    let recognized = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| {
            RECOGNIZED_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
        })
        .unwrap_or(false);
    if !recognized {
        return Err(AssertError::UnsupportedExtension(path.to_path_buf()));
    }

    let content =
        fs::read_to_string(path).map_err(|_| AssertError::FileNotFound(path.to_path_buf()))?;

    if content.trim().is_empty() {
        return Err(AssertError::EmptyFile(path.to_path_buf()));
    }

    Ok(content)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("create file");
        file.write_all(content.as_bytes()).expect("write file");
        path
    }

    #[test]
    fn loads_markdown_and_plain_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let md = write_file(&dir, "instruction.md", "You are terse.");
        let txt = write_file(&dir, "prompt.txt", "What is the capital of France?");

        assert_eq!(load_text(md).expect("md"), "You are terse.");
        assert_eq!(load_text(txt).expect("txt"), "What is the capital of France?");
    }

    #[test]
    fn rejects_unrecognized_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let json = write_file(&dir, "prompt.json", "{\"prompt\": \"hi\"}");

        let error = load_text(json).unwrap_err();
        assert!(matches!(error, AssertError::UnsupportedExtension(_)));
    }

    #[test]
    fn rejects_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = load_text(dir.path().join("absent.md")).unwrap_err();
        assert!(matches!(error, AssertError::FileNotFound(_)));
    }

    #[test]
    fn rejects_blank_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blank = write_file(&dir, "blank.txt", "   \n\t\n");

        let error = load_text(blank).unwrap_err();
        assert!(matches!(error, AssertError::EmptyFile(_)));
    }
}
