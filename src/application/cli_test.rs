use anyhow::Result;

use super::build;
use super::generate_options;

#[test]
fn it_builds_a_valid_command() {
    build().debug_assert();
}

#[test]
fn it_parses_generate_options() -> Result<()> {
    let matches = build().try_get_matches_from(vec![
        "graphgen",
        "generate",
        "-p",
        "A pie chart of browser share",
        "--stream",
    ])?;
    let (name, subcmd_matches) = matches.subcommand().unwrap();
    let options = generate_options(subcmd_matches, &[&matches, subcmd_matches]);

    assert_eq!(name, "generate");
    assert_eq!(options.prompt, Some("A pie chart of browser share".to_string()));
    assert!(options.stream);
    assert!(options.select_model);

    return Ok(());
}

#[test]
fn it_generates_without_a_subcommand() -> Result<()> {
    let matches = build().try_get_matches_from(vec!["graphgen", "-m", "llama3:8b", "--select-model"])?;
    let options = generate_options(&matches, &[&matches]);

    assert!(matches.subcommand().is_none());
    assert!(options.select_model);
    assert_eq!(options.prompt, None);

    return Ok(());
}

#[test]
fn it_skips_model_selection_when_a_model_is_given() -> Result<()> {
    let matches = build().try_get_matches_from(vec![
        "graphgen",
        "generate",
        "--model",
        "llama3:8b",
    ])?;
    let (_, subcmd_matches) = matches.subcommand().unwrap();
    let options = generate_options(subcmd_matches, &[&matches, subcmd_matches]);
    assert!(!options.select_model);

    let matches = build().try_get_matches_from(vec!["graphgen", "-m", "llama3:8b", "generate"])?;
    let (_, subcmd_matches) = matches.subcommand().unwrap();
    let options = generate_options(subcmd_matches, &[&matches, subcmd_matches]);
    assert!(!options.select_model);

    return Ok(());
}

#[test]
fn it_rejects_unknown_openers() {
    let res = build().try_get_matches_from(vec!["graphgen", "--opener", "vim"]);
    assert!(res.is_err());
}
