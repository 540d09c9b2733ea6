use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OpenerName {
    System,
    None,
}

impl OpenerName {
    pub fn parse(text: String) -> Option<OpenerName> {
        return OpenerName::iter().find(|e| return e.to_string() == text);
    }
}

/// Surfaces saved artifacts to the user.
#[async_trait]
pub trait Opener {
    fn name(&self) -> OpenerName;

    async fn open(&self, path: &Path) -> Result<()>;
}

pub type OpenerBox = Box<dyn Opener + Send + Sync>;
