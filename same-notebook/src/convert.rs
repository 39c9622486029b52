//! Notebook loading
//!
//! `.ipynb` files are converted to jupytext light format by the `jupytext`
//! command; anything else is read as already-converted Python source.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

/// Checks if jupytext is installed and available
pub async fn check_jupytext_available() -> Result<()> {
    let output = Command::new("jupytext")
        .arg("--version")
        .output()
        .await
        .context("Failed to execute 'jupytext --version'. Is jupytext installed?")?;

    if !output.status.success() {
        anyhow::bail!("jupytext is not working correctly");
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("jupytext is available: {}", version.trim());

    Ok(())
}

/// Whether `path` must go through jupytext before parsing
pub fn needs_conversion(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ipynb"))
}

/// Read a notebook as jupytext light-format Python source
pub async fn load_notebook(path: &Path) -> Result<String> {
    if !needs_conversion(path) {
        debug!("Reading {} as Python source", path.display());
        return tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read notebook {}", path.display()));
    }

    check_jupytext_available().await?;

    debug!("Converting {} with jupytext", path.display());
    let output = Command::new("jupytext")
        .arg("--to")
        .arg("py:light")
        .arg("--output")
        .arg("-")
        .arg(path)
        .output()
        .await
        .context("Failed to execute jupytext")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "jupytext failed to convert {}: {}",
            path.display(),
            stderr.trim()
        );
    }

    String::from_utf8(output.stdout).context("jupytext produced invalid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_conversion() {
        assert!(needs_conversion(Path::new("notebooks/sample.ipynb")));
        assert!(needs_conversion(Path::new("SAMPLE.IPYNB")));
        assert!(!needs_conversion(Path::new("sample.py")));
        assert!(!needs_conversion(Path::new("sample")));
    }

    #[tokio::test]
    async fn test_load_python_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.py");
        std::fs::write(&path, "# SAME-step-1\nprint(1)\n").unwrap();

        let source = load_notebook(&path).await.unwrap();
        assert_eq!(source, "# SAME-step-1\nprint(1)\n");
    }

    #[tokio::test]
    async fn test_missing_file_reports_path() {
        let err = load_notebook(Path::new("/nonexistent/sample.py"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/sample.py"));
    }
}
