// file_type.rs — InferFileType: classify files by name.
//
// Only the path is inspected. Files that match nothing are marked FAILED,
// and a zero-length file is IGNORE whatever its name.

use fm_workspace::{CheckError, Checker, FileKey, FileType, Workspace};

/// Extensions of auxiliary TeX inputs. `pk` fonts may carry a resolution
/// prefix (`600pk`), handled separately.
const TEX_AUX_EXTS: &[&str] = &[
    "sty", "cls", "mf", "bbl", "bst", "tfm", "ax", "def", "log", "hrfldf", "cfg", "clo", "inx",
    "end", "fgx", "tbx", "rtx", "rty", "toc",
];

/// Plain extension lookups, tried after the special names.
const BY_EXTENSION: &[(&str, FileType)] = &[
    ("abs", FileType::Abs),
    ("fig", FileType::Ignore),
    ("nb", FileType::Notebook),
    ("inp", FileType::Input),
    ("html", FileType::Html),
    ("htm", FileType::Html),
    ("cry", FileType::Encrypted),
    ("tex", FileType::Tex),
    ("bib", FileType::Bibtex),
    ("pdf", FileType::Pdf),
    ("ps", FileType::Postscript),
    ("eps", FileType::Postscript),
    ("dvi", FileType::Dvi),
    ("png", FileType::Image),
    ("jpg", FileType::Image),
    ("jpeg", FileType::Image),
    ("gif", FileType::Image),
    ("tif", FileType::Image),
    ("tiff", FileType::Image),
    ("jar", FileType::Jar),
    ("odt", FileType::Odf),
    ("docx", FileType::Docx),
    ("xlsx", FileType::Xlsx),
    ("rar", FileType::Rar),
    ("zip", FileType::Zip),
    ("tar", FileType::Tar),
    ("tgz", FileType::Gzipped),
    ("gz", FileType::Gzipped),
    ("bz2", FileType::Bzip2),
    ("z", FileType::Compressed),
    ("sh", FileType::Sh),
    ("csh", FileType::Csh),
];

/// Type for a path, or `None` when the name says nothing.
pub fn infer_from_name(path: &str) -> Option<FileType> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name {
        "00README.XXX" => return Some(FileType::Readme),
        "head.tmp" | "body.tmp" => return Some(FileType::AlwaysIgnore),
        "missfont.log" => return Some(FileType::Abort),
        _ => {}
    }

    let ext = match name.rfind('.') {
        Some(idx) if idx > 0 => name[idx + 1..].to_ascii_lowercase(),
        _ => return None,
    };
    if TEX_AUX_EXTS.contains(&ext.as_str()) || is_pk_font(&ext) {
        return Some(FileType::Texaux);
    }
    BY_EXTENSION
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, t)| *t)
}

/// `pk`, `300pk`, `600pk`, ...
fn is_pk_font(ext: &str) -> bool {
    ext.strip_suffix("pk")
        .is_some_and(|prefix| prefix.chars().all(|c| c.is_ascii_digit()))
}

/// Sets the type of every file still UNKNOWN.
#[derive(Debug, Default)]
pub struct InferFileType;

impl Checker for InferFileType {
    fn name(&self) -> &str {
        "InferFileType"
    }

    fn check(&self, workspace: &mut Workspace, file: FileKey) -> Result<FileKey, CheckError> {
        let record = workspace.file(&file)?;
        if record.is_directory || record.file_type != FileType::Unknown {
            return Ok(file);
        }
        let inferred = if record.is_empty() {
            FileType::Ignore
        } else {
            infer_from_name(&record.path).unwrap_or(FileType::Failed)
        };
        tracing::debug!(file = %file, file_type = %inferred, "inferred type");
        workspace.set_file_type(&file, inferred)?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn special_names() {
        assert_eq!(infer_from_name("00README.XXX"), Some(FileType::Readme));
        assert_eq!(infer_from_name("sub/head.tmp"), Some(FileType::AlwaysIgnore));
        assert_eq!(infer_from_name("missfont.log"), Some(FileType::Abort));
    }

    #[test]
    fn tex_aux_files() {
        assert_eq!(infer_from_name("style.STY"), Some(FileType::Texaux));
        assert_eq!(infer_from_name("main.log"), Some(FileType::Texaux));
        assert_eq!(infer_from_name("cmr10.600pk"), Some(FileType::Texaux));
        assert_eq!(infer_from_name("font.pk"), Some(FileType::Texaux));
    }

    #[test]
    fn archives_and_documents() {
        assert_eq!(infer_from_name("src.tar"), Some(FileType::Tar));
        assert_eq!(infer_from_name("src.tar.gz"), Some(FileType::Gzipped));
        assert_eq!(infer_from_name("src.tgz"), Some(FileType::Gzipped));
        assert_eq!(infer_from_name("paper.pdf"), Some(FileType::Pdf));
        assert_eq!(infer_from_name("figs/plot.PNG"), Some(FileType::Image));
        assert_eq!(infer_from_name("index.htm"), Some(FileType::Html));
    }

    #[test]
    fn unknown_names() {
        assert_eq!(infer_from_name("Makefile"), None);
        assert_eq!(infer_from_name(".hidden"), None);
        assert_eq!(infer_from_name("data.xyz"), None);
    }
}
