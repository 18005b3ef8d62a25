use std::{
    fs::File,
    io::{BufWriter, Write},
};

use anyhow::{Context, Result};
use crossterm::style::{Color, Stylize};
use ditdump_core::{Dumper, Event, ExtractOptions, RecordSource, RunSummary};
use tracing::info;

use crate::{
    export::ExportSource,
    hive::{read_system_hive, SystemSecrets},
    output::Output,
    Dump,
};

pub fn dump(args: Dump) -> Result<()> {
    let secrets = read_system_hive(&args.system)?;
    info!("boot key: {}", hex::encode(secrets.boot_key));
    if secrets.no_lm_hash {
        info!("the NoLMHash policy is set");
    }

    let source = ExportSource::open(&args.records)?;

    let file = args
        .out
        .as_ref()
        .map(|path| -> Result<Box<dyn Write>> {
            let file = File::create(path).context("Unable to create the output file")?;
            Ok(Box::new(BufWriter::new(file)))
        })
        .transpose()?;
    let output = Output::new(args.format, args.status, !args.no_print, file);

    let options = ExtractOptions::new()
        .history(args.history)
        .no_lm_hash(secrets.no_lm_hash)
        .enabled_only(args.enabled_only);

    let summary = dump_source(source, &secrets, options, output)?;
    let color = if summary.records_skipped == 0 {
        Color::Green
    } else {
        Color::Yellow
    };
    eprintln!("{}", summary.to_string().with(color));

    Ok(())
}

/// Dumps the hashes of the records of a source to the output.
fn dump_source<S>(
    source: S,
    secrets: &SystemSecrets,
    options: ExtractOptions,
    mut output: Output,
) -> Result<RunSummary>
where
    S: RecordSource + Send + 'static,
{
    let handle = Dumper::new(&secrets.boot_key)?
        .options(options)
        .spawn(source);

    while let Some(event) = handle.recv() {
        // skipped records are already logged by the dumper
        if let Event::Hash(hash) = event {
            output.push(*hash)?;
        }
    }

    let summary = handle
        .join()
        .context("Unable to dump the hashes of the directory")?;
    output.finish()?;

    Ok(summary)
}
