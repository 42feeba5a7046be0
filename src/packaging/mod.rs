//! Splits validated hands into per-table output files, writes the
//! resolved and incomplete bundles, and verifies the archives.


use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::hands::normalize::table_key;
use crate::hands::Hand;
use crate::validate::ValidationReport;

const LOG_TARGET: &str = "packaging";

pub const RESOLVED_ARCHIVE: &str = "resolved.zip";
pub const INCOMPLETE_ARCHIVE: &str = "fallado.zip";

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("io failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("archive failure: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("hand {hand_id} reached packaging without a validation result")]
    MissingValidation { hand_id: String },
    #[error("archive verification failed for {path}: {reason}")]
    Verification { path: PathBuf, reason: String },
}

/// One hand after rewriting. `report` is `None` only when a pipeline bug
/// skipped validation; packaging refuses to proceed in that case.
pub struct HandResult<'a> {
    pub hand: &'a Hand,
    pub output: String,
    pub report: Option<ValidationReport>,
}

/// A per-table output file ready to be written.
#[derive(Clone, Debug)]
pub struct TableOutput {
    pub table_key: String,
    pub file_name: String,
    pub content: String,
    pub clean: bool,
    pub hand_ids: Vec<String>,
    pub residual_ids: Vec<String>,
}

/// Written outputs plus their verified archives.
#[derive(Clone, Debug, Default)]
pub struct PackagedJob {
    pub resolved_files: Vec<PathBuf>,
    pub incomplete_files: Vec<PathBuf>,
    pub resolved_archive: Option<PathBuf>,
    pub incomplete_archive: Option<PathBuf>,
}

/// Groups hands by normalized table name and classifies each table.
///
/// Every input hand lands in exactly one output file: a table is clean
/// only when all of its hands validated clean, otherwise the whole table
/// goes to the incomplete bundle with its leftover ids in the header.
pub fn classify_tables(results: &[HandResult<'_>]) -> Result<Vec<TableOutput>, PackageError> {
    let mut grouped: BTreeMap<String, Vec<&HandResult<'_>>> = BTreeMap::new();
    for result in results {
        if result.report.is_none() {
            return Err(PackageError::MissingValidation {
                hand_id: result.hand.hand_id.clone(),
            });
        }
        grouped
            .entry(table_key(result.hand.table_name.as_deref()))
            .or_default()
            .push(result);
    }

    let mut outputs = Vec::with_capacity(grouped.len());
    for (key, hands) in grouped {
        let clean = hands
            .iter()
            .all(|r| r.report.as_ref().is_some_and(|rep| rep.is_clean()));

        let mut residual_ids: Vec<String> = hands
            .iter()
            .flat_map(|r| crate::rewrite::residual_anon_ids(&r.output))
            .collect();
        residual_ids.sort();
        residual_ids.dedup();

        let body = hands
            .iter()
            .map(|r| r.output.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let content = if clean {
            format!("{body}\n")
        } else {
            // header comment carries the ids a human still has to chase
            format!(
                "# unresolved anonymous ids: {}\n\n{body}\n",
                if residual_ids.is_empty() {
                    "(validation failure)".to_string()
                } else {
                    residual_ids.join(", ")
                }
            )
        };

        let suffix = if clean { "resolved" } else { "fallado" };
        outputs.push(TableOutput {
            file_name: format!("{}_{suffix}.txt", sanitize_file_stem(&key)),
            table_key: key,
            content,
            clean,
            hand_ids: hands.iter().map(|r| r.hand.hand_id.clone()).collect(),
            residual_ids,
        });
    }
    Ok(outputs)
}

/// Writes all table files under `out_dir` and bundles them into the two
/// archives. Archives are re-opened and walked after writing; a bundle
/// that cannot be read back fails the job.
pub async fn write_outputs(
    out_dir: &Path,
    outputs: &[TableOutput],
) -> Result<PackagedJob, PackageError> {
    let resolved_dir = out_dir.join("resolved");
    let incomplete_dir = out_dir.join("fallado");

    let mut packaged = PackagedJob::default();
    for output in outputs {
        let dir = if output.clean {
            &resolved_dir
        } else {
            &incomplete_dir
        };
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| PackageError::Io {
                path: dir.clone(),
                source,
            })?;
        let path = dir.join(&output.file_name);
        tokio::fs::write(&path, &output.content)
            .await
            .map_err(|source| PackageError::Io {
                path: path.clone(),
                source,
            })?;
        if output.clean {
            packaged.resolved_files.push(path);
        } else {
            packaged.incomplete_files.push(path);
        }
    }

    if !packaged.resolved_files.is_empty() {
        packaged.resolved_archive = Some(
            build_archive(out_dir.join(RESOLVED_ARCHIVE), &packaged.resolved_files).await?,
        );
    }
    if !packaged.incomplete_files.is_empty() {
        packaged.incomplete_archive = Some(
            build_archive(out_dir.join(INCOMPLETE_ARCHIVE), &packaged.incomplete_files).await?,
        );
    }

    info!(
        target: LOG_TARGET,
        resolved = packaged.resolved_files.len(),
        incomplete = packaged.incomplete_files.len(),
        "outputs written"
    );

    Ok(packaged)
}

async fn build_archive(
    archive_path: PathBuf,
    files: &[PathBuf],
) -> Result<PathBuf, PackageError> {
    let files = files.to_vec();
    let path = archive_path.clone();
    tokio::task::spawn_blocking(move || -> Result<(), PackageError> {
        write_archive(&path, &files)?;
        verify_archive(&path, files.len())
    })
    .await
    .map_err(|join| PackageError::Verification {
        path: archive_path.clone(),
        reason: format!("archive task failed: {join}"),
    })??;
    Ok(archive_path)
}

fn write_archive(archive_path: &Path, files: &[PathBuf]) -> Result<(), PackageError> {
    let file = std::fs::File::create(archive_path).map_err(|source| PackageError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output.txt".to_string());
        writer.start_file(name, options)?;
        let content = std::fs::read(path).map_err(|source| PackageError::Io {
            path: path.clone(),
            source,
        })?;
        writer.write_all(&content).map_err(|source| PackageError::Io {
            path: archive_path.to_path_buf(),
            source,
        })?;
    }
    writer.finish()?;
    Ok(())
}

/// Open, walk, and fully read every entry.
fn verify_archive(archive_path: &Path, expected_entries: usize) -> Result<(), PackageError> {
    let file = std::fs::File::open(archive_path).map_err(|source| PackageError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(file).map_err(|e| PackageError::Verification {
        path: archive_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if archive.len() != expected_entries {
        return Err(PackageError::Verification {
            path: archive_path.to_path_buf(),
            reason: format!("{} entries, expected {expected_entries}", archive.len()),
        });
    }
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| PackageError::Verification {
            path: archive_path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut sink = Vec::new();
        entry
            .read_to_end(&mut sink)
            .map_err(|e| PackageError::Verification {
                path: archive_path.to_path_buf(),
                reason: format!("entry {index} unreadable: {e}"),
            })?;
    }
    Ok(())
}

/// Keeps table names usable as file stems; non-ASCII is preserved (the
/// archive format stores UTF-8 names), path separators are not.
fn sanitize_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
