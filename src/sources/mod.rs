use crate::model::DesktopEntry;
use anyhow::Result;

pub trait Source {
    fn scan(&self) -> Result<Vec<DesktopEntry>>;
}

pub mod desktop;
