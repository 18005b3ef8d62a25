//! Renders the dumped hashes.

use std::{collections::BTreeMap, io::Write};

use anyhow::{Context, Result};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_BORDERS_ONLY, Cell, Color, Table};
use ditdump_core::{attributes, DumpedHash, Hash, TypedValue, EMPTY_LM_HASH, EMPTY_NT_HASH};
use serde::Serialize;
use serde_json::{Number, Value};

/// The output formats.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// `domain\user:rid:lm:nt:::` lines, as printed by secretsdump.
    Secretsdump,
    /// A JSON array of accounts, with every attribute of the records.
    Json,
    /// A table for the console.
    Table,
}

/// Returns the name of an account, prefixed with its domain when it is known.
fn qualified_name(hash: &DumpedHash) -> String {
    match hash
        .user_principal_name
        .as_deref()
        .and_then(|upn| upn.rsplit_once('@'))
    {
        Some((_, domain)) => format!("{domain}\\{}", hash.username),
        None => hash.username.clone(),
    }
}

fn status(hash: &DumpedHash) -> &'static str {
    if hash.enabled() {
        "Enabled"
    } else {
        "Disabled"
    }
}

/// Formats an account as secretsdump lines.
/// The first line holds the current hashes, the next ones the password history.
pub fn secretsdump_lines(hash: &DumpedHash, with_status: bool) -> Vec<String> {
    let name = qualified_name(hash);

    let mut current = format!(
        "{name}:{}:{}:{}:::",
        hash.rid,
        hex::encode(hash.lm_hash),
        hex::encode(hash.nt_hash)
    );
    if with_status {
        current.push_str(&format!(" (status={})", status(hash)));
    }

    let mut lines = vec![current];

    // the first entry of the history is the current password
    let history_len = hash.nt_history.len().max(hash.lm_history.len());
    for i in 1..history_len {
        let lm = hash.lm_history.get(i).unwrap_or(&EMPTY_LM_HASH);
        let nt = hash.nt_history.get(i).unwrap_or(&EMPTY_NT_HASH);

        lines.push(format!(
            "{name}_history{}:{}:{}:{}:::",
            i - 1,
            hash.rid,
            hex::encode(lm),
            hex::encode(nt)
        ));
    }

    lines
}

#[derive(Serialize)]
struct JsonHash<'a> {
    username: &'a str,
    rid: u32,
    sid: String,
    lm_hash: String,
    nt_hash: String,
    enabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    lm_history: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    nt_history: Vec<String>,
    attributes: BTreeMap<&'a str, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attribute_errors: Vec<String>,
}

fn json_value(value: &TypedValue) -> Value {
    match value {
        TypedValue::Absent => Value::Null,
        TypedValue::Bool(v) => Value::Bool(*v),
        TypedValue::I16(v) => Value::from(*v),
        TypedValue::U16(v) => Value::from(*v),
        TypedValue::I32(v) => Value::from(*v),
        TypedValue::U32(v) => Value::from(*v),
        TypedValue::I64(v) => Value::from(*v),
        TypedValue::U64(v) => Value::from(*v),
        TypedValue::F32(v) => Number::from_f64(f64::from(*v)).map_or(Value::Null, Value::Number),
        TypedValue::F64(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
        TypedValue::Bytes(bytes) => Value::String(hex::encode(bytes)),
        TypedValue::Text(text) => Value::String(text.clone()),
    }
}

fn hex_list(hashes: &[Hash]) -> Vec<String> {
    hashes.iter().map(hex::encode).collect()
}

fn to_json(hash: &DumpedHash) -> JsonHash<'_> {
    JsonHash {
        username: &hash.username,
        rid: hash.rid,
        sid: hash.sid.to_string(),
        lm_hash: hex::encode(hash.lm_hash),
        nt_hash: hex::encode(hash.nt_hash),
        enabled: hash.enabled(),
        lm_history: hex_list(&hash.lm_history),
        nt_history: hex_list(&hash.nt_history),
        attributes: hash
            .attributes
            .iter()
            .map(|(column, value)| {
                let name = attributes::display_name(column).unwrap_or(column.as_str());
                (name, json_value(value))
            })
            .collect(),
        attribute_errors: hash
            .attribute_errors
            .iter()
            .map(ToString::to_string)
            .collect(),
    }
}

/// Formats the accounts as a JSON array.
pub fn json(hashes: &[DumpedHash]) -> Result<String> {
    let hashes: Vec<_> = hashes.iter().map(to_json).collect();

    serde_json::to_string_pretty(&hashes).context("Unable to serialize the hashes")
}

/// Formats the accounts as a table.
pub fn table(hashes: &[DumpedHash], with_status: bool, styled: bool) -> Table {
    let mut display_table = Table::new();
    display_table.load_preset(UTF8_BORDERS_ONLY);
    if !styled {
        display_table.force_no_tty();
    }

    let mut header = vec!["Username", "RID", "LM hash", "NT hash"];
    if with_status {
        header.push("Status");
    }
    display_table.set_header(header);

    let hash_cell = |hash: &Hash, empty: &Hash| {
        let cell = Cell::new(hex::encode(hash));
        if hash == empty {
            cell.fg(Color::Grey)
        } else {
            cell.fg(Color::Green)
        }
    };

    for hash in hashes {
        let mut row = vec![
            Cell::new(qualified_name(hash)),
            Cell::new(hash.rid),
            hash_cell(&hash.lm_hash, &EMPTY_LM_HASH),
            hash_cell(&hash.nt_hash, &EMPTY_NT_HASH),
        ];

        if with_status {
            let color = if hash.enabled() {
                Color::Green
            } else {
                Color::Red
            };
            row.push(Cell::new(status(hash)).fg(color));
        }

        display_table.add_row(row);
    }

    display_table
}

/// Where and how the hashes are written.
pub struct Output {
    format: Format,
    with_status: bool,
    print: bool,
    file: Option<Box<dyn Write>>,
    hashes: Vec<DumpedHash>,
}

impl Output {
    pub fn new(
        format: Format,
        with_status: bool,
        print: bool,
        file: Option<Box<dyn Write>>,
    ) -> Self {
        Self {
            format,
            with_status,
            print,
            file,
            hashes: Vec::new(),
        }
    }

    /// Adds an account to the output.
    /// secretsdump lines are written right away, the other formats on [`Output::finish`].
    pub fn push(&mut self, hash: DumpedHash) -> Result<()> {
        if self.format != Format::Secretsdump {
            self.hashes.push(hash);
            return Ok(());
        }

        for line in secretsdump_lines(&hash, self.with_status) {
            if self.print {
                println!("{line}");
            }

            if let Some(file) = &mut self.file {
                writeln!(file, "{line}").context("Unable to write to the output file")?;
            }
        }

        Ok(())
    }

    /// Writes the buffered accounts and flushes the output file.
    pub fn finish(mut self) -> Result<()> {
        match self.format {
            Format::Secretsdump => (),
            Format::Json => {
                let json = json(&self.hashes)?;
                if self.print {
                    println!("{json}");
                }
                if let Some(file) = &mut self.file {
                    writeln!(file, "{json}").context("Unable to write to the output file")?;
                }
            }
            Format::Table => {
                if self.print {
                    println!("{}", table(&self.hashes, self.with_status, true));
                }
                if let Some(file) = &mut self.file {
                    let table = table(&self.hashes, self.with_status, false);
                    writeln!(file, "{table}").context("Unable to write to the output file")?;
                }
            }
        }

        if let Some(file) = &mut self.file {
            file.flush().context("Unable to write to the output file")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use ditdump_core::{DitError, DumpedHash, Sid, TypedValue, EMPTY_LM_HASH, EMPTY_NT_HASH};
    use serde_json::Value;

    use super::{json, secretsdump_lines, table};

    const NT_HASH: &str = "32ed87bdb5fdc5e9cba88547376818d4";

    fn dumped(username: &str, rid: u32) -> DumpedHash {
        DumpedHash {
            rid,
            sid: Sid {
                revision: 1,
                identifier_authority: [0, 0, 0, 0, 0, 5],
                sub_authorities: vec![21, 1, 2, 3, rid],
            },
            username: username.to_owned(),
            user_principal_name: None,
            lm_hash: EMPTY_LM_HASH,
            nt_hash: hex::decode(NT_HASH).unwrap().try_into().unwrap(),
            lm_history: Vec::new(),
            nt_history: Vec::new(),
            account_type: 0x3000_0000,
            user_account_control: Some(0x0200),
            attributes: BTreeMap::new(),
            attribute_errors: Vec::new(),
        }
    }

    #[test]
    fn test_secretsdump_line() {
        let hash = dumped("Administrator", 500);

        assert_eq!(
            vec![format!(
                "Administrator:500:aad3b435b51404eeaad3b435b51404ee:{NT_HASH}:::"
            )],
            secretsdump_lines(&hash, false)
        );
    }

    #[test]
    fn test_secretsdump_domain_and_status() {
        let mut hash = dumped("alice", 1000);
        hash.user_principal_name = Some("alice@corp.local".to_owned());
        hash.user_account_control = Some(0x0202);

        assert_eq!(
            vec![format!(
                "corp.local\\alice:1000:aad3b435b51404eeaad3b435b51404ee:{NT_HASH}::: (status=Disabled)"
            )],
            secretsdump_lines(&hash, true)
        );
    }

    #[test]
    fn test_secretsdump_history() {
        let mut hash = dumped("bob", 1001);
        hash.nt_history = vec![hash.nt_hash, [0x11; 16], [0x22; 16]];
        hash.lm_history = vec![EMPTY_LM_HASH, [0x33; 16]];

        let lines = secretsdump_lines(&hash, false);

        assert_eq!(3, lines.len());
        assert_eq!(
            format!(
                "bob_history0:1001:{}:{}:::",
                "33".repeat(16),
                "11".repeat(16)
            ),
            lines[1]
        );
        assert_eq!(
            format!(
                "bob_history1:1001:{}:{}:::",
                hex::encode(EMPTY_LM_HASH),
                "22".repeat(16)
            ),
            lines[2]
        );
    }

    #[test]
    fn test_json() {
        let mut hash = dumped("alice", 1000);
        hash.attributes
            .insert("ATTj589832".to_owned(), TypedValue::I32(0x0200));
        hash.attributes
            .insert("ATTr589970".to_owned(), TypedValue::Bytes(vec![0x01, 0xff]));
        hash.attributes
            .insert("ATTx1".to_owned(), TypedValue::F64(f64::NAN));

        let json: Value = serde_json::from_str(&json(&[hash]).unwrap()).unwrap();
        let account = &json[0];

        assert_eq!("alice", account["username"]);
        assert_eq!(1000, account["rid"]);
        assert_eq!(EMPTY_NT_HASH.len() * 2, account["nt_hash"].as_str().unwrap().len());
        assert_eq!(true, account["enabled"]);
        assert_eq!(0x0200, account["attributes"]["userAccountControl"]);
        assert_eq!("01ff", account["attributes"]["objectSid"]);
        assert!(account["attributes"]["ATTx1"].is_null());
        assert!(account.get("nt_history").is_none());
        assert!(account.get("attribute_errors").is_none());
    }

    #[test]
    fn test_json_attribute_errors() {
        let mut hash = dumped("bob", 1107);
        hash.attribute_errors.push(DitError::Attribute {
            attribute: "dBCSPwd",
            source: Box::new(DitError::PekIndexOutOfRange { index: 4, len: 2 }),
        });

        let json: Value = serde_json::from_str(&json(&[hash]).unwrap()).unwrap();
        let error = json[0]["attribute_errors"][0].as_str().unwrap();

        assert!(error.starts_with("Unable to decrypt the dBCSPwd attribute"));
        assert!(error.contains("index 4"));
    }

    #[test]
    fn test_table() {
        let rendered = table(&[dumped("alice", 1000)], true, false).to_string();

        assert!(rendered.contains("alice"));
        assert!(rendered.contains(NT_HASH));
        assert!(rendered.contains("Enabled"));
    }
}
