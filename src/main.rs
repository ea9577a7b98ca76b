use anyhow::{Context, Result};
use clap::Parser;
use spxd::{AccountRecord, Search, SearchOptions};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Search for accounts in a sysPass XML export", long_about = None)]
struct Cli {
    /// Account name to search for; lists every account when omitted
    name: Option<String>,
    /// Path to the XML export file
    #[arg(long)]
    xmlpath: PathBuf,
    /// Export encryption password; prompted for when omitted
    #[arg(long)]
    password: Option<String>,
    /// Master password for record secrets; prompted for when omitted
    #[arg(long)]
    master_password: Option<String>,
    /// Key to verify the XML signature with
    #[arg(long)]
    signature: Option<String>,
    /// Display category on search results
    #[arg(long)]
    with_categories: bool,
    /// Display tags on search results
    #[arg(long)]
    with_tags: bool,
    /// Do not truncate text fields
    #[arg(long)]
    wide: bool,
    /// Export results to export.json and export.csv
    #[arg(long)]
    export: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    let password = match cli.password.clone() {
        Some(password) => Some(password),
        None => prompt("XML password")?,
    };
    let master_password = match cli.master_password.clone() {
        Some(password) => Some(password),
        None => prompt("Master password")?,
    };

    let container = spxd::open(&cli.xmlpath)?
        .unseal(password.as_deref(), cli.signature.as_deref())?;

    let options = SearchOptions {
        with_categories: cli.with_categories,
        with_tags: cli.with_tags,
        truncate: !cli.wide,
    };
    let mut search = Search::new(&container).with_options(options);
    if let Some(master_password) = &master_password {
        search = search.with_master_password(master_password.clone());
    }

    let accounts = match &cli.name {
        Some(name) => search.by_name(name)?,
        None => search.all()?,
    };

    let date = container
        .xml_date()
        .map(|date| date.to_rfc3339())
        .unwrap_or_else(|| container.xml_time().to_string());
    println!("====");
    println!("XML file sysPass version: {}", container.xml_version());
    println!("XML file date: {}", date);
    println!("====");
    println!("Include categories: {}", yes_no(options.with_categories));
    println!("Include tags: {}", yes_no(options.with_tags));
    println!("Wide output: {}", yes_no(!options.truncate));
    println!("====");

    match &cli.name {
        Some(name) => println!("List of accounts for name: \"{}\"", name),
        None => println!("List of accounts"),
    }
    println!();

    if !accounts.is_empty() {
        print_table(&accounts);
        if cli.export {
            export_to_files(&accounts)?;
        }
    }

    println!();
    println!("Total items: {}", accounts.len());
    if master_password.is_none() {
        println!("Passwords not decrypted because master password wasn't set");
    }
    if options.truncate {
        println!("Truncated output for text fields");
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn prompt(label: &str) -> Result<Option<String>> {
    let value = rpassword::prompt_password(format!("{}: ", label))
        .with_context(|| format!("prompting for {}", label))?;
    Ok(if value.is_empty() { None } else { Some(value) })
}

fn print_table(accounts: &[AccountRecord]) {
    let header: Vec<&str> = match accounts.first() {
        Some(first) => first.fields().iter().map(|(name, _)| *name).collect(),
        None => return,
    };

    let mut widths: Vec<usize> = header.iter().map(|name| name.chars().count()).collect();
    for account in accounts {
        for (idx, (_, value)) in account.fields().iter().enumerate() {
            widths[idx] = widths[idx].max(value.chars().count());
        }
    }

    let print_row = |cells: &[&str]| {
        let row: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:width$}", cell, width = *width))
            .collect();
        println!("| {} |", row.join(" | "));
    };

    let separator: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    print_row(&header);
    println!("|-{}-|", separator.join("-|-"));
    for account in accounts {
        let cells: Vec<&str> = account.fields().iter().map(|(_, value)| *value).collect();
        print_row(&cells);
    }
}

fn export_to_files(accounts: &[AccountRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(accounts)?;
    std::fs::write("./export.json", json).context("writing export.json")?;

    let mut csv = File::create("./export.csv").context("writing export.csv")?;
    for account in accounts {
        let row: Vec<String> = account
            .fields()
            .iter()
            .map(|(_, value)| csv_field(value))
            .collect();
        writeln!(csv, "{}", row.join(","))?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
