/// Model file auto-download from HuggingFace.
///
/// Fetches the ONNX export and tokenizer of the embedding model and of the
/// cross-encoder reranker when they are not already on disk.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// A HuggingFace model repository and the files we need from it.
#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    /// `owner/name` on HuggingFace.
    pub repo: &'static str,
    /// `(local file name, path inside the repository)`.
    pub files: &'static [(&'static str, &'static str)],
}

const ONNX_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
];

/// Embedding model (384 dimensions, CLS pooling).
pub const BGE_SMALL_EN: ModelSpec = ModelSpec {
    repo: "BAAI/bge-small-en-v1.5",
    files: ONNX_FILES,
};

/// Pairwise relevance model used by the reranker.
pub const MS_MARCO_MINILM: ModelSpec = ModelSpec {
    repo: "cross-encoder/ms-marco-MiniLM-L-6-v2",
    files: ONNX_FILES,
};

impl ModelSpec {
    /// Default local directory: `models/<model name>`.
    #[must_use]
    pub fn default_dir(&self) -> PathBuf {
        let name = self.repo.rsplit('/').next().unwrap_or(self.repo);
        PathBuf::from("models").join(name)
    }

    fn url(&self, path: &str) -> String {
        format!("https://huggingface.co/{}/resolve/main/{path}", self.repo)
    }
}

/// Check whether every file of `spec` exists in `model_dir`.
#[must_use]
pub fn all_files_present(spec: &ModelSpec, model_dir: &Path) -> bool {
    spec.files
        .iter()
        .all(|(name, _)| model_dir.join(name).exists())
}

/// Download the files of `spec` that are missing from `model_dir`.
pub fn ensure_model_files(spec: &ModelSpec, model_dir: &Path) -> Result<()> {
    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create models directory: {}", model_dir.display()))?;

    if all_files_present(spec, model_dir) {
        info!("Model files for {} found in {}", spec.repo, model_dir.display());
        return Ok(());
    }

    info!("Downloading {} from HuggingFace (one-time)", spec.repo);
    for &(filename, url_path) in spec.files {
        let dest = model_dir.join(filename);
        if dest.exists() {
            continue;
        }

        let url = spec.url(url_path);
        info!("Downloading {filename}...");
        download_file(&dest, &url).with_context(|| format!("failed to download {filename}"))?;
    }

    info!("Model download complete");
    Ok(())
}

/// Download a single file with a progress bar, via a temp file so a broken
/// transfer never leaves a truncated model behind.
fn download_file(dest: &Path, url: &str) -> Result<()> {
    let resp =
        reqwest::blocking::get(url).with_context(|| format!("HTTP request failed: {url}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let total = resp.content_length().unwrap_or(0);
    let pb = if total > 0 {
        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}) {msg}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }
        pb
    } else {
        ProgressBar::new_spinner()
    };

    let partial = dest.with_extension("part");
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("failed to create file: {}", partial.display()))?;

    let bytes = resp.bytes().context("failed to read response body")?;
    file.write_all(&bytes).context("failed to write file")?;
    pb.set_position(bytes.len() as u64);
    pb.finish_and_clear();

    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move download into {}", dest.display()))?;
    Ok(())
}
