use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Fixed on-disk layout for one pipeline run.
///
/// Every stage writes to a stage-specific filename under the root, so two
/// runs sharing a root race on the intermediates (last writer wins).
/// Single-run CLI use only.
#[derive(Debug, Clone)]
pub struct ImageWorkspace {
    root: PathBuf,
}

/// Artifact families written beneath the working directory, each in its own
/// subdirectory with 1-indexed sequential filenames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Edit,
    Generated,
    Variant,
}

impl OutputKind {
    fn dir(self) -> &'static str {
        match self {
            Self::Edit => "edits",
            Self::Generated => "generated",
            Self::Variant => "variants",
        }
    }

    fn stem(self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Generated => "generated",
            Self::Variant => "variant",
        }
    }
}

impl ImageWorkspace {
    /// Open the working directory, creating it if absent.
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// PNG copy of the caller's source image.
    pub fn original(&self) -> PathBuf {
        self.root.join("original.png")
    }

    /// Square subject-centered thumbnail from the smart-crop service.
    pub fn thumbnail(&self) -> PathBuf {
        self.root.join("smartCropped.png")
    }

    /// Raw segmentation service output, cutout or matte depending on mode.
    pub fn segmentation(&self) -> PathBuf {
        self.root.join("backgroundForeground.png")
    }

    /// Inverted grayscale matte, kept for inspection.
    pub fn inverted_matte(&self) -> PathBuf {
        self.root.join("invertedBackgroundForeground.png")
    }

    /// The transparency mask submitted to the edit API.
    pub fn mask(&self) -> PathBuf {
        self.root.join("mask.png")
    }

    /// Path for the nth artifact of `kind` (1-indexed), creating the
    /// subdirectory on first use.
    pub fn output(&self, kind: OutputKind, index: usize) -> io::Result<PathBuf> {
        let dir = self.root.join(kind.dir());
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{}{index}.png", kind.stem())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_makes_the_root_directory() -> io::Result<()> {
        let temp = tempfile::tempdir()?;
        let root = temp.path().join("images");
        assert!(!root.exists());
        let workspace = ImageWorkspace::create(&root)?;
        assert!(root.is_dir());
        assert_eq!(workspace.root(), root);
        Ok(())
    }

    #[test]
    fn stage_filenames_are_fixed() -> io::Result<()> {
        let temp = tempfile::tempdir()?;
        let workspace = ImageWorkspace::create(temp.path())?;
        assert!(workspace.original().ends_with("original.png"));
        assert!(workspace.thumbnail().ends_with("smartCropped.png"));
        assert!(workspace.segmentation().ends_with("backgroundForeground.png"));
        assert!(workspace
            .inverted_matte()
            .ends_with("invertedBackgroundForeground.png"));
        assert!(workspace.mask().ends_with("mask.png"));
        Ok(())
    }

    #[test]
    fn outputs_are_one_indexed_per_family() -> io::Result<()> {
        let temp = tempfile::tempdir()?;
        let workspace = ImageWorkspace::create(temp.path())?;

        let first = workspace.output(OutputKind::Edit, 1)?;
        assert!(first.ends_with("edits/edit1.png"));
        assert!(temp.path().join("edits").is_dir());

        let second = workspace.output(OutputKind::Edit, 2)?;
        assert!(second.ends_with("edits/edit2.png"));

        assert!(workspace
            .output(OutputKind::Generated, 1)?
            .ends_with("generated/generated1.png"));
        assert!(workspace
            .output(OutputKind::Variant, 3)?
            .ends_with("variants/variant3.png"));
        Ok(())
    }
}
