use std::io;

use anyhow::Result;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use dialoguer::Input;
use dialoguer::Password;
use dialoguer::Select;

use crate::domain::services::DEFAULT_PROMPT;

/// Ctrl-C on a prompt surfaces as an interrupted read. Treat it like Esc.
fn cancelled<T>(res: dialoguer::Result<T>) -> Result<Option<T>> {
    return match res {
        Ok(val) => Ok(Some(val)),
        Err(dialoguer::Error::IO(err)) if err.kind() == io::ErrorKind::Interrupted => Ok(None),
        Err(err) => Err(err.into()),
    };
}

/// Asks for the graph description. Blank input falls back to the default
/// prompt.
pub fn graph_description() -> Result<Option<String>> {
    let res = cancelled(
        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt("Describe the graph you want to generate")
            .default(DEFAULT_PROMPT.to_string())
            .allow_empty(true)
            .interact_text(),
    )?;

    return Ok(res.map(|prompt| {
        if prompt.trim().is_empty() {
            return DEFAULT_PROMPT.to_string();
        }
        return prompt.trim().to_string();
    }));
}

pub fn select(prompt: &str, items: &[String], default: usize) -> Result<Option<usize>> {
    let res = cancelled(
        Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(default)
            .items(items)
            .interact_opt(),
    )?;

    return Ok(res.flatten());
}

pub fn confirm(prompt: &str, default: bool) -> Result<Option<bool>> {
    let res = cancelled(
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(default)
            .interact_opt(),
    )?;

    return Ok(res.flatten());
}

pub fn secret(prompt: &str) -> Result<Option<String>> {
    return cancelled(
        Password::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact(),
    );
}
