//! Whitelist dispatch table: the command is only runnable at all if its
//! basename resolves to an entry here (spec §4.6 step 2, "closed
//! whitelist of command families"), and each entry owns a validator
//! that checks its specific argument shape (step 3).

use crate::errors::GateError;
use std::collections::HashMap;

pub struct CommandSpec {
    pub validator: Box<dyn Fn(&[String]) -> Result<(), GateError> + Send + Sync>,
    pub needs_confirmation: bool,
}

pub struct Whitelist {
    entries: HashMap<String, CommandSpec>,
}

impl Whitelist {
    pub fn insert(&mut self, name: impl Into<String>, spec: CommandSpec) {
        self.entries.insert(name.into(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.entries.get(name)
    }
}

/// The basename of the executable, case-folded, with any directory
/// prefix stripped — `./manage.py` and `manage.py` key the same.
pub fn command_key(exe: &str) -> String {
    std::path::Path::new(exe)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| exe.to_lowercase())
}

fn allow_any(_args: &[String]) -> Result<(), GateError> {
    Ok(())
}

/// `manage.py`-style framework management commands have three argument
/// tiers (spec §4.6 step 3): safe (no confirmation), confirmation-required
/// (destructive but reversible), and forbidden (never runnable at all).
fn validate_manage_subcommand(args: &[String]) -> Result<(), GateError> {
    const FORBIDDEN: &[&str] = &["flush", "sqlflush", "dbshell", "shell"];

    let subcommand = args.first().map(|s| s.as_str()).unwrap_or("");
    if FORBIDDEN.contains(&subcommand) {
        return Err(GateError::ValidatorRejected(format!(
            "manage.py subcommand '{subcommand}' is forbidden"
        )));
    }
    for arg in args.iter().skip(1) {
        if arg.starts_with('-') && !matches!(arg.as_str(), "--noinput" | "--check" | "--dry-run" | "-v" | "--verbosity") {
            return Err(GateError::ValidatorRejected(format!(
                "flag '{arg}' is not permitted for manage.py"
            )));
        }
    }
    Ok(())
}

fn validate_package_install(args: &[String]) -> Result<(), GateError> {
    let name_re = regex::Regex::new(r"^[A-Za-z0-9_.\-\[\]==<>,!]+$").unwrap();
    for arg in args {
        if arg.starts_with('-') {
            continue;
        }
        if !name_re.is_match(arg) {
            return Err(GateError::ValidatorRejected(format!(
                "'{arg}' is not a well-formed package specifier"
            )));
        }
    }
    Ok(())
}

impl Default for Whitelist {
    fn default() -> Self {
        let mut whitelist = Self {
            entries: HashMap::new(),
        };

        whitelist.insert(
            "manage.py",
            CommandSpec {
                validator: Box::new(validate_manage_subcommand),
                needs_confirmation: false,
            },
        );
        whitelist.insert(
            "python",
            CommandSpec {
                validator: Box::new(|args| {
                    if args.first().map(|s| s.ends_with("manage.py")).unwrap_or(false) {
                        validate_manage_subcommand(&args[1..])
                    } else {
                        allow_any(args)
                    }
                }),
                needs_confirmation: false,
            },
        );
        whitelist.insert(
            "python3",
            CommandSpec {
                validator: Box::new(allow_any),
                needs_confirmation: false,
            },
        );
        whitelist.insert(
            "pytest",
            CommandSpec {
                validator: Box::new(allow_any),
                needs_confirmation: false,
            },
        );
        whitelist.insert(
            "pip",
            CommandSpec {
                validator: Box::new(|args| {
                    if args.first().map(|s| s.as_str()) == Some("install") {
                        validate_package_install(&args[1..])
                    } else if args.first().map(|s| s.as_str()) == Some("uninstall") {
                        Err(GateError::ValidatorRejected("pip uninstall requires confirmation outside this gate".into()))
                    } else {
                        allow_any(args)
                    }
                }),
                needs_confirmation: true,
            },
        );
        whitelist.insert(
            "npm",
            CommandSpec {
                validator: Box::new(|args| {
                    let sub = args.first().map(|s| s.as_str()).unwrap_or("");
                    if matches!(sub, "install" | "ci" | "run" | "test" | "build") {
                        Ok(())
                    } else {
                        Err(GateError::ValidatorRejected(format!("npm subcommand '{sub}' is not permitted")))
                    }
                }),
                needs_confirmation: false,
            },
        );
        whitelist.insert(
            "node",
            CommandSpec {
                validator: Box::new(allow_any),
                needs_confirmation: false,
            },
        );
        whitelist.insert(
            "mkdir",
            CommandSpec {
                validator: Box::new(|args| {
                    if args.iter().any(|a| a == "-p" || !a.starts_with('-')) {
                        Ok(())
                    } else {
                        Err(GateError::ValidatorRejected("mkdir requires a target directory".into()))
                    }
                }),
                needs_confirmation: false,
            },
        );
        whitelist.insert(
            "git",
            CommandSpec {
                validator: Box::new(|args| {
                    let sub = args.first().map(|s| s.as_str()).unwrap_or("");
                    match sub {
                        "status" | "diff" | "log" | "add" | "commit" => Ok(()),
                        "push" | "reset" => Err(GateError::ValidatorRejected(format!(
                            "git subcommand '{sub}' requires confirmation outside this gate"
                        ))),
                        other => Err(GateError::ValidatorRejected(format!("git subcommand '{other}' is not permitted"))),
                    }
                }),
                needs_confirmation: false,
            },
        );

        whitelist
    }
}
