// src/main.rs

//! mport - package manager CLI entry point

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mport::{Error, Mport, Settings, Verbosity};

mod cli;
mod commands;

use cli::{Cli, Commands, ConfigCommands, MirrorCommands};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    std::process::exit(match run(cli) {
        Ok(()) => 0,
        Err(e) => match e.downcast_ref::<Error>() {
            Some(err) => {
                eprintln!("mport: {err}");
                err.exit_code()
            }
            None => {
                eprintln!("mport: {e}");
                2
            }
        },
    });
}

fn run(cli: Cli) -> Result<()> {
    if cli.show_version {
        println!("mport {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let Some(command) = cli.command else {
        println!("No command given; see mport --help");
        return Err(Error::Warn("nothing to do".to_string()).into());
    };

    let root = commands::effective_root(cli.chroot.as_deref());
    let settings = Settings::load(std::path::Path::new("/etc/mport.conf"))?;

    let mut mport = Mport::open(root, settings)?;
    mport.verbosity = Verbosity::from_flags(cli.quiet, cli.brief, cli.verbose);
    mport.force = cli.force;
    mport.no_index = cli.no_index;
    mport.output_path = cli.output;

    match command {
        Commands::Install {
            automatic,
            packages,
        } => commands::install(&mut mport, &packages, automatic)?,
        Commands::Add { automatic, files } => commands::add(&mut mport, &files, automatic)?,
        Commands::Delete { packages } => commands::delete(&mut mport, &packages)?,
        Commands::Update { packages } => commands::update(&mut mport, &packages)?,
        Commands::Upgrade => commands::upgrade(&mut mport)?,
        Commands::Autoremove => commands::autoremove(&mut mport)?,
        Commands::Clean => commands::clean(&mut mport)?,
        Commands::Verify {
            recompute,
            packages,
        } => commands::verify(&mut mport, &packages, recompute)?,
        Commands::Deleteall => commands::deleteall(&mut mport)?,
        Commands::Search { terms } => commands::search(&mport, &terms)?,
        Commands::Info { package } => commands::info(&mport, &package)?,
        Commands::List { filter } => commands::list(&mport, filter.as_deref())?,
        Commands::Which {
            quiet,
            origin,
            path,
        } => commands::which(&mport, &path, quiet, origin)?,
        Commands::Stats => commands::stats(&mport)?,
        Commands::Index => commands::fetch_index(&mport)?,
        Commands::Mirror { command } => match command {
            MirrorCommands::List => commands::mirror(&mport, None)?,
            MirrorCommands::Select { country } => commands::mirror(&mport, Some(&country))?,
        },
        Commands::Download {
            depends,
            all,
            packages,
        } => commands::download(&mut mport, &packages, depends, all)?,
        Commands::Config { command } => match command {
            ConfigCommands::List => commands::config_list(&mport)?,
            ConfigCommands::Get { name } => commands::config_get(&mport, &name)?,
            ConfigCommands::Set { name, value } => commands::config_set(&mport, &name, &value)?,
        },
        Commands::Audit {
            depends_on,
            package,
        } => commands::audit(&mport, package.as_deref(), depends_on)?,
        Commands::Lock { package } => commands::lock(&mut mport, &package)?,
        Commands::Unlock { package } => commands::unlock(&mut mport, &package)?,
        Commands::Locks => commands::locks(&mport)?,
        Commands::Cpe { package } => commands::cpe(&mport, package.as_deref())?,
        Commands::Purl { package } => commands::purl(&mport, package.as_deref())?,
        Commands::Import { file } => commands::import(&mut mport, &file)?,
        Commands::Export { file } => commands::export(&mport, &file)?,
        Commands::Version { test } => match test {
            Some(pair) if pair.len() == 2 => commands::version_test(&mport, &pair[0], &pair[1])?,
            _ => println!("mport {}", env!("CARGO_PKG_VERSION")),
        },
    }

    Ok(())
}
