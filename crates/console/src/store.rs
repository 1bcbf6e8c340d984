use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Credential pair saved at login and removed at logout.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Credentials {
    pub user_id: String,
    pub token: String,
}

#[derive(Serialize, Deserialize, Default)]
struct StoreData {
    /// Per-user last-active conversation id.
    #[serde(default)]
    conversations: HashMap<String, String>,
    #[serde(default)]
    credentials: Option<Credentials>,
}

/// Durable client state, one JSON file under the user config dir.
/// Writes are synchronous and last-write-wins; concurrent processes are
/// not coordinated.
pub struct LocalStore {
    path: PathBuf,
    data: StoreData,
}

impl LocalStore {
    pub fn open() -> Result<Self> {
        Self::at(default_path()?)
    }

    pub fn at(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self { path, data: StoreData::default() });
        }

        let content = std::fs::read_to_string(&path)?;
        let data: StoreData = serde_json::from_str(&content)?;
        Ok(Self { path, data })
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn conversation_id(&self, user_id: &str) -> Option<&str> {
        self.data.conversations.get(user_id).map(String::as_str)
    }

    pub fn set_conversation_id(&mut self, user_id: &str, conversation_id: &str) -> Result<()> {
        self.data
            .conversations
            .insert(user_id.to_string(), conversation_id.to_string());
        self.save()
    }

    pub fn clear_conversation(&mut self, user_id: &str) -> Result<()> {
        self.data.conversations.remove(user_id);
        self.save()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.data.credentials.as_ref()
    }

    pub fn login(&mut self, user_id: &str, token: &str) -> Result<()> {
        self.data.credentials = Some(Credentials {
            user_id: user_id.to_string(),
            token: token.to_string(),
        });
        self.save()
    }

    /// Logout drops credentials and every cached conversation id.
    pub fn logout(&mut self) -> Result<()> {
        self.data.credentials = None;
        self.data.conversations.clear();
        self.save()
    }
}

fn default_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home.join(".config").join("steward").join("state.json"))
}
