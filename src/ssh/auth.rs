// ABOUTME: Picks the credentials a session authenticates with.
// ABOUTME: An explicit key file wins, then the forwarded agent, then the usual ~/.ssh identities.

use super::error::{Error, Result};
use super::host_key::HostKeyCheck;
use russh::client::Handle;
use russh::keys::agent::client::AgentClient;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixStream;
use tracing::debug;

pub(crate) enum Credentials {
    Agent(AgentClient<UnixStream>),
    Key(Arc<ssh_key::PrivateKey>),
}

impl Credentials {
    pub(crate) async fn resolve(key_path: Option<&Path>, use_agent: bool) -> Result<Self> {
        if let Some(path) = key_path {
            let key = load_secret_key(path, None).map_err(|e| Error::Key {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            return Ok(Credentials::Key(Arc::new(key)));
        }

        if use_agent && let Ok(agent) = AgentClient::connect_env().await {
            debug!("authenticating with the ssh agent");
            return Ok(Credentials::Agent(agent));
        }

        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| Error::NoCredentials("no agent, no key_path and HOME unset".into()))?;
        default_identities(&home)
            .iter()
            .find_map(|path| load_secret_key(path, None).ok())
            .map(|key| Credentials::Key(Arc::new(key)))
            .ok_or_else(|| Error::NoCredentials(format!("no agent and no key under {}/.ssh", home.display())))
    }

    /// Offer the credentials; `false` means the server refused all of them.
    pub(crate) async fn authenticate(self, handle: &mut Handle<HostKeyCheck>, user: &str) -> Result<bool> {
        match self {
            Credentials::Agent(mut agent) => {
                let identities = agent
                    .request_identities()
                    .await
                    .map_err(|e| Error::NoCredentials(format!("agent: {e}")))?;
                if identities.is_empty() {
                    return Err(Error::NoCredentials("agent holds no keys".into()));
                }
                for identity in identities {
                    if let Ok(result) = handle
                        .authenticate_publickey_with(user, identity, None, &mut agent)
                        .await
                        && result.success()
                    {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Credentials::Key(key) => {
                let hash = handle.best_supported_rsa_hash().await?.flatten();
                let result = handle
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash))
                    .await?;
                Ok(result.success())
            }
        }
    }
}

/// Identity files tried when nothing else is configured, most preferred first.
fn default_identities(home: &Path) -> [PathBuf; 3] {
    let ssh = home.join(".ssh");
    [ssh.join("id_ed25519"), ssh.join("id_ecdsa"), ssh.join("id_rsa")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ed25519_is_preferred() {
        let ids = default_identities(Path::new("/home/ops"));
        assert_eq!(ids[0], PathBuf::from("/home/ops/.ssh/id_ed25519"));
        assert_eq!(ids[2], PathBuf::from("/home/ops/.ssh/id_rsa"));
    }

    #[tokio::test]
    async fn unreadable_key_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_cluster");
        std::fs::write(&path, "not a key").unwrap();
        let Err(Error::Key { path: reported, .. }) = Credentials::resolve(Some(&path), false).await
        else {
            panic!("garbage key must not load");
        };
        assert_eq!(reported, path);
    }
}
