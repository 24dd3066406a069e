//! Command-line argument parsing.
//!
//! Usage:
//!   dirpp [-s<dir>]... [-t<dir>] [-c<file> | -f] [-D<name>=<value>]...
//!         [-e<exts>] [-k<exts>] [-g<exts>] [-x<pattern>]... [-r<mode>] [-uwonvlh]

use std::path::PathBuf;

use crate::comments::CommentMode;
use crate::config::{split_list, Config};

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Source roots (`-s<dir>`), added to any from the config file.
    pub sources: Vec<PathBuf>,
    /// Target directory (`-t<dir>`).
    pub target: Option<PathBuf>,
    /// Which config file to load.
    pub config: ConfigFile,
    /// Predefined globals (`-D<name>=<value>`).
    pub defines: Vec<(String, String)>,
    /// Processed extensions (`-e<list>`).
    pub extensions: Option<Vec<String>>,
    /// Copy-only extensions (`-k<list>`).
    pub copy_extensions: Option<Vec<String>>,
    /// Copy-only extensions scanned in the global phase (`-g<list>`).
    pub scan_extensions: Option<Vec<String>>,
    /// Exclude patterns (`-x<pattern>`).
    pub excludes: Vec<String>,
    /// Comment removal (`-r<mode>`).
    pub comments: Option<CommentMode>,
    /// Unknown variables read as false (`-u`).
    pub unknown_as_false: bool,
    /// Indented directives (`-w`).
    pub allow_whitespace: bool,
    /// Only write changed destinations (`-o`).
    pub only_if_changed: bool,
    /// Dry run (`-n`).
    pub dry_run: bool,
    /// Debug logging (`-v`).
    pub verbose: bool,
    /// Print the directive reference and exit (`-l`).
    pub list_directives: bool,
    /// Print usage and exit (`-h`).
    pub help: bool,
}

/// How to choose the config file.
#[derive(Debug, Default, PartialEq)]
pub enum ConfigFile {
    /// Search the user config directory, then `./dirpp.conf` (default).
    #[default]
    Search,
    /// `-f`: no config file.
    Skip,
    /// `-c<file>`: load this specific file.
    Explicit(PathBuf),
}

pub const USAGE: &str = "\
Usage: dirpp [-s<dir>]... [-t<dir>] [-c<file> | -f] [-D<name>=<value>]...
             [-e<exts>] [-k<exts>] [-g<exts>] [-x<pattern>]...
             [-r keep|remove|directives]
             [-u] [-w] [-o] [-n] [-v] [-l] [-h]";

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // Bare words are source roots.
        if !arg.starts_with('-') || arg == "-" {
            args.sources.push(PathBuf::from(arg));
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            let flag = chars[j];
            match flag {
                'u' => args.unknown_as_false = true,
                'w' => args.allow_whitespace = true,
                'o' => args.only_if_changed = true,
                'n' => args.dry_run = true,
                'v' => args.verbose = true,
                'l' => args.list_directives = true,
                'h' => args.help = true,
                'f' => args.config = ConfigFile::Skip,

                's' | 't' | 'c' | 'D' | 'e' | 'k' | 'g' | 'x' | 'r' => {
                    // -x<val> or -x <val>
                    let value = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err(format!("-{flag} requires an argument"));
                    };
                    apply_valued(&mut args, flag, value)?;
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    Ok(args)
}

fn apply_valued(args: &mut CliArgs, flag: char, value: String) -> Result<(), String> {
    match flag {
        's' => args.sources.push(PathBuf::from(value)),
        't' => args.target = Some(PathBuf::from(value)),
        'c' => args.config = ConfigFile::Explicit(PathBuf::from(value)),
        'D' => {
            let (name, literal) = match value.split_once('=') {
                Some((n, v)) => (n.trim().to_owned(), v.to_owned()),
                None => (value.trim().to_owned(), "true".to_owned()),
            };
            if name.is_empty() {
                return Err("-D requires a variable name".to_owned());
            }
            args.defines.push((name, literal));
        }
        'e' => args.extensions = Some(split_list(&value)),
        'k' => args.copy_extensions = Some(split_list(&value)),
        'g' => args.scan_extensions = Some(split_list(&value)),
        'x' => args.excludes.push(value),
        'r' => args.comments = Some(value.parse()?),
        _ => return Err(format!("unknown option: -{flag}")),
    }
    Ok(())
}

// ── Applying ──────────────────────────────────────────────────────────────────

impl CliArgs {
    /// Layer these arguments over a loaded config.
    pub fn apply(&self, config: &mut Config) -> Result<(), String> {
        config.sources.extend(self.sources.iter().cloned());
        if let Some(t) = &self.target {
            config.target = t.clone();
        }
        if let Some(e) = &self.extensions {
            config.extensions = e.clone();
        }
        if let Some(k) = &self.copy_extensions {
            config.copy_extensions = k.clone();
        }
        if let Some(g) = &self.scan_extensions {
            config.scan_extensions = g.clone();
        }
        for pattern in &self.excludes {
            config.set("exclude", pattern)?;
        }
        if let Some(mode) = self.comments {
            config.comments = mode;
        }
        config.unknown_as_false |= self.unknown_as_false;
        config.allow_whitespace |= self.allow_whitespace;
        config.only_if_changed |= self.only_if_changed;
        config.dry_run |= self.dry_run;
        for (name, value) in &self.defines {
            config.define(name, value)?;
        }
        Ok(())
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Search for the user config file in the standard locations.
/// Returns the first path that exists, or `None`.
pub fn find_user_config() -> Option<PathBuf> {
    let user = directories::ProjectDirs::from("", "", "dirpp")
        .map(|dirs| dirs.config_dir().join("dirpp.conf"));
    user.into_iter()
        .chain(std::iter::once(PathBuf::from("./dirpp.conf")))
        .find(|p| p.is_file())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn empty_args() {
        let a = parse_argv(&argv(&[])).unwrap();
        assert!(a.sources.is_empty());
        assert_eq!(a.config, ConfigFile::Search);
        assert!(!a.dry_run);
    }

    #[test]
    fn bool_flags() {
        let a = parse_argv(&argv(&["-u", "-w", "-o", "-n", "-v", "-l", "-h"])).unwrap();
        assert!(a.unknown_as_false && a.allow_whitespace && a.only_if_changed);
        assert!(a.dry_run && a.verbose && a.list_directives && a.help);
    }

    #[test]
    fn combined_bool_flags() {
        let a = parse_argv(&argv(&["-uwn"])).unwrap();
        assert!(a.unknown_as_false && a.allow_whitespace && a.dry_run);
    }

    #[test]
    fn valued_flags_embedded_and_separate() {
        let a = parse_argv(&argv(&["-ssrc", "-s", "lib", "-tout/gen", "-x", "**/*.bak"])).unwrap();
        assert_eq!(a.sources, vec![PathBuf::from("src"), PathBuf::from("lib")]);
        assert_eq!(a.target, Some(PathBuf::from("out/gen")));
        assert_eq!(a.excludes, vec!["**/*.bak".to_owned()]);
    }

    #[test]
    fn flag_group_ending_in_valued_flag() {
        let a = parse_argv(&argv(&["-ut", "build"])).unwrap();
        assert!(a.unknown_as_false);
        assert_eq!(a.target, Some(PathBuf::from("build")));
    }

    #[test]
    fn defines() {
        let a = parse_argv(&argv(&["-DDEBUG=true", "-D", "NAME=\"x\"", "-DFLAG"])).unwrap();
        assert_eq!(
            a.defines,
            vec![
                ("DEBUG".to_owned(), "true".to_owned()),
                ("NAME".to_owned(), "\"x\"".to_owned()),
                ("FLAG".to_owned(), "true".to_owned()),
            ]
        );
        assert!(parse_argv(&argv(&["-D=1"])).is_err());
    }

    #[test]
    fn config_selection() {
        let a = parse_argv(&argv(&["-f"])).unwrap();
        assert_eq!(a.config, ConfigFile::Skip);
        let a = parse_argv(&argv(&["-c", "my.conf"])).unwrap();
        assert_eq!(a.config, ConfigFile::Explicit(PathBuf::from("my.conf")));
    }

    #[test]
    fn extension_lists_and_comment_mode() {
        let a = parse_argv(&argv(&["-e", ".java,txt", "-kpng,tmpl", "-g", "tmpl", "-rdirectives"]))
            .unwrap();
        assert_eq!(a.extensions, Some(vec!["java".to_owned(), "txt".to_owned()]));
        assert_eq!(a.copy_extensions, Some(vec!["png".to_owned(), "tmpl".to_owned()]));
        assert_eq!(a.scan_extensions, Some(vec!["tmpl".to_owned()]));
        assert_eq!(a.comments, Some(CommentMode::RemoveDirectives));
        assert!(parse_argv(&argv(&["-r", "bogus"])).is_err());
    }

    #[test]
    fn missing_value_and_unknown_flag() {
        assert!(parse_argv(&argv(&["-t"])).is_err());
        assert!(parse_argv(&argv(&["-z"])).is_err());
    }

    #[test]
    fn apply_layers_over_config() {
        let (mut cfg, _) = Config::load_str("source = a\ntarget = t1\nglobal X = 1\n");
        let a = parse_argv(&argv(&["-s", "b", "-t", "t2", "-DX=2", "-u", "-gtmpl"])).unwrap();
        a.apply(&mut cfg).unwrap();
        assert_eq!(cfg.scan_extensions, vec!["tmpl".to_owned()]);
        assert_eq!(cfg.sources, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(cfg.target, PathBuf::from("t2"));
        assert_eq!(cfg.globals, vec![("X".to_owned(), "2".to_owned())]);
        assert!(cfg.unknown_as_false);
    }

    #[test]
    fn apply_rejects_bad_exclude() {
        let a = parse_argv(&argv(&["-x", "[nope"])).unwrap();
        assert!(a.apply(&mut Config::new()).is_err());
    }
}
