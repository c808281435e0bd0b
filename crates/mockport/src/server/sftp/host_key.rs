//! SFTP host identity.
//!
//! The key lives at the configured path, or at a per-port path under the data
//! directory. Whichever it is, a missing file gets a freshly generated RSA key
//! so clients see a stable host fingerprint across restarts.

use crate::server::ServerError;
use russh::keys::ssh_key::private::RsaKeypair;
use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::ssh_key::LineEnding;
use russh::keys::PrivateKey;
use std::path::Path;
use tracing::info;

const GENERATED_KEY_BITS: usize = 2048;

/// Load the host key from `configured` (falling back to `generated_path`),
/// generating it at that path if the file does not exist yet.
///
/// Blocking: key generation takes a noticeable amount of CPU.
pub fn load_or_generate_host_key(
    configured: Option<&Path>,
    generated_path: &Path,
) -> Result<PrivateKey, ServerError> {
    let path = configured.unwrap_or(generated_path);
    if path.exists() {
        return load(path);
    }
    generate(path)
}

fn generate(path: &Path) -> Result<PrivateKey, ServerError> {
    info!("Generating RSA host key at {:?}", path);
    let keypair = RsaKeypair::random(&mut OsRng, GENERATED_KEY_BITS)
        .map_err(|e| ServerError::HostKey(format!("failed to generate host key: {e}")))?;
    let key = PrivateKey::from(keypair);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ServerError::HostKey(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    // Written with owner-only permissions on unix.
    key.write_openssh_file(path, LineEnding::LF).map_err(|e| {
        ServerError::HostKey(format!("failed to write host key {}: {e}", path.display()))
    })?;
    Ok(key)
}

fn load(path: &Path) -> Result<PrivateKey, ServerError> {
    russh::keys::load_secret_key(path, None).map_err(|e| {
        ServerError::HostKey(format!("failed to load host key {}: {e}", path.display()))
    })
}
