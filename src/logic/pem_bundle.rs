//! Splitting of multi-block PEM files

use pkcs8::der::pem;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PemBundleError {
    #[error("unterminated PEM block {label}")]
    Unterminated { label: String },

    #[error("PEM block {label}: {reason}")]
    Decode { label: String, reason: String },
}

/// One decoded `-----BEGIN <label>-----` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemBlock {
    pub label: String,
    pub der: Vec<u8>,
}

/// Decode every PEM block in `text`, in file order
///
/// Text outside BEGIN/END markers (comments, bag attributes) is ignored.
pub fn split_pem_bundle(text: &str) -> Result<Vec<PemBlock>, PemBundleError> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in text.lines() {
        let line = line.trim_end();
        match current.as_mut() {
            None => {
                if let Some(label) = marker(line, "-----BEGIN ") {
                    current = Some((label.to_string(), format!("{line}\n")));
                }
            }
            Some((label, body)) => {
                body.push_str(line);
                body.push('\n');
                if marker(line, "-----END ").is_some() {
                    let label = std::mem::take(label);
                    let (decoded_label, der) =
                        pem::decode_vec(body.as_bytes()).map_err(|e| PemBundleError::Decode {
                            label: label.clone(),
                            reason: e.to_string(),
                        })?;
                    blocks.push(PemBlock {
                        label: decoded_label.to_string(),
                        der,
                    });
                    current = None;
                }
            }
        }
    }

    match current {
        Some((label, _)) => Err(PemBundleError::Unterminated { label }),
        None => Ok(blocks),
    }
}

fn marker<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)?.strip_suffix("-----")
}
