//! Embedding export in safetensors and plain-text word-vector formats.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use candle_core::{DType, Device, Tensor};
use lexlm_core::Vocabulary;
use safetensors::tensor::{Dtype, TensorView};
use tracing::info;

/// Name of the embedding tensor inside the safetensors file.
pub const EMBEDDINGS_KEY: &str = "embeddings";

fn host_rows(embeddings: &Tensor) -> Result<(usize, usize, Vec<f32>)> {
    let (rows, dim) = embeddings.dims2().context("Embeddings must be a 2-D table")?;
    let values = embeddings
        .to_device(&Device::Cpu)?
        .to_dtype(DType::F32)?
        .flatten_all()?
        .to_vec1::<f32>()?;
    Ok((rows, dim, values))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// Writes the `(vocab, dim)` table as a single safetensors tensor with
/// `vocab_size` and `dim` metadata.
pub fn write_embeddings_binary<P: AsRef<Path>>(path: P, embeddings: &Tensor) -> Result<()> {
    let path = path.as_ref();
    let (rows, dim, values) = host_rows(embeddings)?;
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();

    let view = TensorView::new(Dtype::F32, vec![rows, dim], &bytes)?;
    let metadata = HashMap::from([
        ("vocab_size".to_string(), rows.to_string()),
        ("dim".to_string(), dim.to_string()),
    ]);

    ensure_parent(path)?;
    safetensors::serialize_to_file([(EMBEDDINGS_KEY, view)], &Some(metadata), path)
        .with_context(|| format!("Failed to write embeddings {}", path.display()))?;
    Ok(())
}

/// Writes one line per vocabulary entry: the token followed by its
/// space-separated vector.
pub fn write_embeddings_text<P: AsRef<Path>>(
    path: P,
    embeddings: &Tensor,
    vocab: &Vocabulary,
) -> Result<()> {
    let path = path.as_ref();
    let (rows, dim, values) = host_rows(embeddings)?;
    if rows != vocab.len() {
        bail!(
            "Embedding table has {} rows but the vocabulary has {} entries",
            rows,
            vocab.len()
        );
    }

    ensure_parent(path)?;
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for (token, row) in vocab.tokens().iter().zip(values.chunks(dim.max(1))) {
        write!(out, "{token}")?;
        for value in row {
            write!(out, " {value}")?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

/// Writes both formats.
pub fn export_embeddings(
    binary: &Path,
    text: &Path,
    embeddings: &Tensor,
    vocab: &Vocabulary,
) -> Result<()> {
    write_embeddings_binary(binary, embeddings)?;
    write_embeddings_text(text, embeddings, vocab)?;
    info!(binary = %binary.display(), text = %text.display(), "Exported embeddings");
    Ok(())
}
