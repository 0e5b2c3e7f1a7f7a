// file_type.rs — Classification of uploaded files.
//
// The declaration order is meaningful: a type's position is its priority
// when deciding which file drives compilation, so `Ord` is derived and
// `priority()` is just the discriminant.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Known file types. Serialized by code name (`"TEX"`, `"TEX_priority"`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileType {
    #[default]
    Unknown,
    Abort,
    Failed,
    Directory,
    AlwaysIgnore,
    Input,
    Bibtex,
    Postscript,
    DosEps,
    PsFont,
    PsPc,
    Image,
    Anim,
    Html,
    Pdf,
    Dvi,
    Notebook,
    Odf,
    Docx,
    Tex,
    Pdftex,
    #[serde(rename = "TEX_priority2")]
    TexPriority2,
    TexAms,
    #[serde(rename = "TEX_priority")]
    TexPriority,
    TexMac,
    Latex,
    #[serde(rename = "LATEX2e")]
    Latex2e,
    Pdflatex,
    Texinfo,
    Mf,
    Uuencoded,
    Encrypted,
    Pc,
    Mac,
    Csh,
    Sh,
    Jar,
    Rar,
    Xlsx,
    Compressed,
    Zip,
    Gzipped,
    Bzip2,
    MultiPartMime,
    Tar,
    Ignore,
    Readme,
    Texaux,
    Abs,
    Include,
}

impl FileType {
    /// Every variant, in priority order.
    pub const ALL: [FileType; 50] = [
        FileType::Unknown,
        FileType::Abort,
        FileType::Failed,
        FileType::Directory,
        FileType::AlwaysIgnore,
        FileType::Input,
        FileType::Bibtex,
        FileType::Postscript,
        FileType::DosEps,
        FileType::PsFont,
        FileType::PsPc,
        FileType::Image,
        FileType::Anim,
        FileType::Html,
        FileType::Pdf,
        FileType::Dvi,
        FileType::Notebook,
        FileType::Odf,
        FileType::Docx,
        FileType::Tex,
        FileType::Pdftex,
        FileType::TexPriority2,
        FileType::TexAms,
        FileType::TexPriority,
        FileType::TexMac,
        FileType::Latex,
        FileType::Latex2e,
        FileType::Pdflatex,
        FileType::Texinfo,
        FileType::Mf,
        FileType::Uuencoded,
        FileType::Encrypted,
        FileType::Pc,
        FileType::Mac,
        FileType::Csh,
        FileType::Sh,
        FileType::Jar,
        FileType::Rar,
        FileType::Xlsx,
        FileType::Compressed,
        FileType::Zip,
        FileType::Gzipped,
        FileType::Bzip2,
        FileType::MultiPartMime,
        FileType::Tar,
        FileType::Ignore,
        FileType::Readme,
        FileType::Texaux,
        FileType::Abs,
        FileType::Include,
    ];

    /// Types that are some flavour of TeX source.
    pub const TEX_TYPES: [FileType; 10] = [
        FileType::Latex,
        FileType::Tex,
        FileType::TexPriority,
        FileType::TexAms,
        FileType::TexMac,
        FileType::Latex2e,
        FileType::TexPriority2,
        FileType::Texinfo,
        FileType::Pdflatex,
        FileType::Pdftex,
    ];

    pub fn priority(self) -> usize {
        self as usize
    }

    pub fn is_tex_type(self) -> bool {
        Self::TEX_TYPES.contains(&self)
    }

    /// Code name, as used in serialized records.
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Unknown => "UNKNOWN",
            FileType::Abort => "ABORT",
            FileType::Failed => "FAILED",
            FileType::Directory => "DIRECTORY",
            FileType::AlwaysIgnore => "ALWAYS_IGNORE",
            FileType::Input => "INPUT",
            FileType::Bibtex => "BIBTEX",
            FileType::Postscript => "POSTSCRIPT",
            FileType::DosEps => "DOS_EPS",
            FileType::PsFont => "PS_FONT",
            FileType::PsPc => "PS_PC",
            FileType::Image => "IMAGE",
            FileType::Anim => "ANIM",
            FileType::Html => "HTML",
            FileType::Pdf => "PDF",
            FileType::Dvi => "DVI",
            FileType::Notebook => "NOTEBOOK",
            FileType::Odf => "ODF",
            FileType::Docx => "DOCX",
            FileType::Tex => "TEX",
            FileType::Pdftex => "PDFTEX",
            FileType::TexPriority2 => "TEX_priority2",
            FileType::TexAms => "TEX_AMS",
            FileType::TexPriority => "TEX_priority",
            FileType::TexMac => "TEX_MAC",
            FileType::Latex => "LATEX",
            FileType::Latex2e => "LATEX2e",
            FileType::Pdflatex => "PDFLATEX",
            FileType::Texinfo => "TEXINFO",
            FileType::Mf => "MF",
            FileType::Uuencoded => "UUENCODED",
            FileType::Encrypted => "ENCRYPTED",
            FileType::Pc => "PC",
            FileType::Mac => "MAC",
            FileType::Csh => "CSH",
            FileType::Sh => "SH",
            FileType::Jar => "JAR",
            FileType::Rar => "RAR",
            FileType::Xlsx => "XLSX",
            FileType::Compressed => "COMPRESSED",
            FileType::Zip => "ZIP",
            FileType::Gzipped => "GZIPPED",
            FileType::Bzip2 => "BZIP2",
            FileType::MultiPartMime => "MULTI_PART_MIME",
            FileType::Tar => "TAR",
            FileType::Ignore => "IGNORE",
            FileType::Readme => "README",
            FileType::Texaux => "TEXAUX",
            FileType::Abs => "ABS",
            FileType::Include => "INCLUDE",
        }
    }

    /// Human-readable name shown to submitters.
    pub fn name(self) -> &'static str {
        match self {
            FileType::Unknown => "Unknown",
            FileType::Abort => "Immediate stop",
            FileType::Failed => "unknown",
            FileType::Directory => "unknown",
            FileType::AlwaysIgnore => "Always ignore",
            FileType::Input => "Input for (La)TeX",
            FileType::Bibtex => "BiBTeX",
            FileType::Postscript => "Postscript",
            FileType::DosEps => "DOS EPS Binary File",
            FileType::PsFont => "Postscript Type 1 Font",
            FileType::PsPc => "^D%! Postscript",
            FileType::Image => "Image (gif/jpg etc)",
            FileType::Anim => "Animation (mpeg etc)",
            FileType::Html => "HTML",
            FileType::Pdf => "PDF",
            FileType::Dvi => "DVI",
            FileType::Notebook => "Mathematica Notebook",
            FileType::Odf => "OpenDocument Format",
            FileType::Docx => "Microsoft DOCX",
            FileType::Tex => "TEX",
            FileType::Pdftex => "PDFTEX",
            FileType::TexPriority2 => "TeX (with \\end or \\bye - not starting a line)",
            FileType::TexAms => "AMSTeX",
            FileType::TexPriority => "TeX (with \\end or \\bye)",
            FileType::TexMac => "TeX +macros (harv,lanl..)",
            FileType::Latex => "LaTeX",
            FileType::Latex2e => "LATEX2e",
            FileType::Pdflatex => "PDFLATEX",
            FileType::Texinfo => "Texinfo",
            FileType::Mf => "Metafont",
            FileType::Uuencoded => "UUencoded",
            FileType::Encrypted => "Encrypted",
            FileType::Pc => "PC-ctrl-Ms",
            FileType::Mac => "MAC-ctrl-Ms",
            FileType::Csh => "CSH",
            FileType::Sh => "SH",
            FileType::Jar => "JAR archive",
            FileType::Rar => "RAR archive",
            FileType::Xlsx => "Microsoft XLSX",
            FileType::Compressed => "UNIX-compressed",
            FileType::Zip => "ZIP-compressed",
            FileType::Gzipped => "GZIP-compressed",
            FileType::Bzip2 => "BZIP2-compressed",
            FileType::MultiPartMime => "MULTI_PART_MIME",
            FileType::Tar => "TAR archive",
            FileType::Ignore => " user defined IGNORE",
            FileType::Readme => "override",
            FileType::Texaux => "TeX auxiliary",
            FileType::Abs => "abstract",
            FileType::Include => " keep",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown file type '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_follows_declaration_order() {
        assert_eq!(FileType::Unknown.priority(), 0);
        assert_eq!(FileType::Include.priority(), 49);
        assert!(FileType::Latex.priority() > FileType::Tex.priority());
        assert!(FileType::Latex2e > FileType::Latex);
    }

    #[test]
    fn code_names_round_trip_through_serde() {
        for t in FileType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
            let back: FileType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, t);
            assert_eq!(t.as_str().parse::<FileType>().unwrap(), t);
        }
    }

    #[test]
    fn tex_types() {
        assert!(FileType::Pdflatex.is_tex_type());
        assert!(FileType::TexPriority2.is_tex_type());
        assert!(!FileType::Bibtex.is_tex_type());
        assert_eq!(FileType::Gzipped.name(), "GZIP-compressed");
    }
}
