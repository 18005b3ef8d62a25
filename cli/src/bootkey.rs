use anyhow::Result;
use crossterm::style::{Color, Stylize};

use crate::{hive::read_system_hive, Bootkey};

pub fn bootkey(args: Bootkey) -> Result<()> {
    let secrets = read_system_hive(&args.system)?;

    println!("{}", hex::encode(secrets.boot_key));
    if secrets.no_lm_hash {
        eprintln!(
            "{}",
            "The NoLMHash policy is set, LM hashes are not stored".with(Color::Yellow)
        );
    }

    Ok(())
}
