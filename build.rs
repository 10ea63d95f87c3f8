// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("templedb")
        .version(env!("CARGO_PKG_VERSION"))
        .author("templedb Contributors")
        .about("Database-native source control for multi-agent editing")
        .subcommand_required(false)
        .subcommand(Command::new("init").about("Initialize the templedb store"))
        .subcommand(
            Command::new("project")
                .about("Project registry and the checkout / commit loop")
                .subcommand(
                    Command::new("import")
                        .about("Scan a directory tree into the store as a new project")
                        .arg(Arg::new("path").required(true).help("Directory to import"))
                        .arg(
                            Arg::new("slug")
                                .long("slug")
                                .help("Project slug (default: derived from the directory name)"),
                        ),
                )
                .subcommand(Command::new("list").about("List projects"))
                .subcommand(
                    Command::new("checkout")
                        .about("Materialize a project's default branch head into a directory")
                        .arg(Arg::new("project").required(true).help("Project slug"))
                        .arg(Arg::new("dir").required(true).help("Target directory"))
                        .arg(
                            Arg::new("force")
                                .long("force")
                                .action(ArgAction::SetTrue)
                                .help("Overwrite the target directory if it exists"),
                        ),
                )
                .subcommand(
                    Command::new("commit")
                        .about("Rescan a checkout directory and commit its changes")
                        .arg(Arg::new("project").required(true).help("Project slug"))
                        .arg(Arg::new("dir").required(true).help("Checkout directory"))
                        .arg(
                            Arg::new("message")
                                .short('m')
                                .long("message")
                                .required(true)
                                .help("Commit message"),
                        )
                        .arg(
                            Arg::new("strategy")
                                .long("strategy")
                                .default_value("abort")
                                .value_parser(["abort", "force"])
                                .help("Conflict strategy"),
                        )
                        .arg(
                            Arg::new("force")
                                .long("force")
                                .action(ArgAction::SetTrue)
                                .help("Shorthand for --strategy force"),
                        ),
                ),
        )
        .subcommand(
            Command::new("vcs")
                .about("Version-control queries")
                .subcommand(
                    Command::new("log")
                        .about("Show commit history")
                        .arg(Arg::new("project").required(true).help("Project slug"))
                        .arg(
                            Arg::new("limit")
                                .short('n')
                                .long("limit")
                                .help("Maximum number of commits"),
                        )
                        .arg(Arg::new("branch").long("branch").help("Branch to follow")),
                )
                .subcommand(
                    Command::new("status")
                        .about("Show working-state status")
                        .arg(Arg::new("project").required(true).help("Project slug"))
                        .arg(Arg::new("branch").long("branch").help("Branch")),
                )
                .subcommand(
                    Command::new("branch")
                        .about("List branches, or create one")
                        .arg(Arg::new("project").required(true).help("Project slug"))
                        .arg(Arg::new("name").help("Branch name to create")),
                )
                .subcommand(
                    Command::new("show")
                        .about("Show a commit by hash prefix")
                        .arg(Arg::new("project").required(true).help("Project slug"))
                        .arg(
                            Arg::new("hash_prefix")
                                .required(true)
                                .help("Commit hash or unique prefix"),
                        ),
                ),
        )
        .subcommand(
            Command::new("checkouts")
                .about("Checkout bookkeeping")
                .subcommand(
                    Command::new("cleanup")
                        .about("List (and with --force remove) stale checkouts")
                        .arg(
                            Arg::new("force")
                                .long("force")
                                .action(ArgAction::SetTrue)
                                .help("Actually remove the stale rows"),
                        ),
                ),
        )
        .subcommand(
            Command::new("backup")
                .about("Copy the store to a backup file")
                .arg(Arg::new("path").help("Destination path")),
        )
        .subcommand(
            Command::new("restore")
                .about("Replace the store from a backup file")
                .arg(Arg::new("path").required(true).help("Backup file")),
        )
        .subcommand(Command::new("gc").about("Delete unreferenced content blobs"))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("templedb.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
