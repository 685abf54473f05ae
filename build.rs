// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn pkg_arg() -> Arg {
    Arg::new("package").help("Package name")
}

fn build_cli() -> Command {
    Command::new("mport")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Package manager for binary packages")
        .subcommand_required(false)
        .arg(
            Arg::new("chroot")
                .short('c')
                .value_name("DIR")
                .help("Operate inside a chroot directory"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .value_name("PATH")
                .help("Download directory override"),
        )
        .arg(
            Arg::new("force")
                .short('f')
                .action(clap::ArgAction::SetTrue)
                .help("Force the operation, waiving precondition checks"),
        )
        .arg(
            Arg::new("no_index")
                .short('U')
                .action(clap::ArgAction::SetTrue)
                .help("Skip the index refresh"),
        )
        .subcommand(
            Command::new("install")
                .about("Install packages by name from the index")
                .arg(pkg_arg().required(true)),
        )
        .subcommand(
            Command::new("add")
                .about("Install packages from local bundle files")
                .arg(Arg::new("file").required(true).help("Bundle file path")),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete installed packages")
                .arg(pkg_arg().required(true)),
        )
        .subcommand(
            Command::new("update")
                .about("Update named packages to the index version")
                .arg(pkg_arg().required(true)),
        )
        .subcommand(Command::new("upgrade").about("Upgrade every installed package"))
        .subcommand(Command::new("autoremove").about("Remove orphaned automatic packages"))
        .subcommand(Command::new("clean").about("Garbage-collect caches and incomplete installs"))
        .subcommand(
            Command::new("verify")
                .about("Verify installed files against recorded checksums")
                .arg(pkg_arg()),
        )
        .subcommand(Command::new("deleteall").about("Delete every installed package"))
        .subcommand(
            Command::new("search")
                .about("Search the index")
                .arg(Arg::new("term").required(true).help("Search term")),
        )
        .subcommand(
            Command::new("info")
                .about("Show details for an installed package")
                .arg(pkg_arg().required(true)),
        )
        .subcommand(
            Command::new("list")
                .about("List installed packages")
                .arg(Arg::new("filter").help("updates | prime")),
        )
        .subcommand(
            Command::new("which")
                .about("Look up which package owns a file")
                .arg(Arg::new("path").required(true).help("File path")),
        )
        .subcommand(Command::new("stats").about("Show package database statistics"))
        .subcommand(Command::new("index").about("Fetch a fresh copy of the package index"))
        .subcommand(
            Command::new("audit")
                .about("Audit installed packages against the CVE feed")
                .arg(pkg_arg()),
        )
        .subcommand(
            Command::new("lock")
                .about("Lock a package against updates and deletion")
                .arg(pkg_arg().required(true)),
        )
        .subcommand(
            Command::new("unlock")
                .about("Unlock a package")
                .arg(pkg_arg().required(true)),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("mport.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
