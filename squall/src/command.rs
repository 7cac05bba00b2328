//! Turns one textual command into a root [`Job`].
//!
//! The grammar is deliberately thin: a command word, recognized flags, and
//! positional arguments classified by shape (`s3://` vs local path). `&&` and
//! `||` chain follow-up commands onto the success / failure branch.

use std::str::FromStr;

use camino::Utf8Path;
use color_eyre::{
    eyre::{bail, ensure, WrapErr as _},
    Result,
};
use squall_s3_helpers::S3Uri;

use crate::argument::Argument;
use crate::job::Job;
use crate::keyglob;
use crate::op::Operation;
use crate::options::Options;

/// Parses a full submitted line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Job>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let tokens = shell_words::split(line).wrap_err("failed to tokenize command")?;

    let mut segments: Vec<Vec<String>> = vec![Vec::new()];
    let mut connectors: Vec<String> = Vec::new();
    for token in tokens {
        if token == "&&" || token == "||" {
            connectors.push(token);
            segments.push(Vec::new());
        } else {
            segments.last_mut().expect("nonempty").push(token);
        }
    }

    let mut jobs = segments
        .iter()
        .map(|segment| parse_single(segment, line))
        .collect::<Result<Vec<_>>>()?;

    // Attach right-to-left so each connector binds to its preceding command.
    while jobs.len() > 1 {
        let job = jobs.pop().expect("len checked");
        let connector = connectors.pop().expect("one connector per extra job");
        let previous = jobs.last_mut().expect("len checked");
        if connector == "&&" {
            previous.success_next = Some(Box::new(job));
        } else {
            previous.fail_next = Some(Box::new(job));
        }
    }
    Ok(Some(jobs.pop().expect("at least one segment")))
}

fn parse_single(tokens: &[String], source_desc: &str) -> Result<Job> {
    let Some((command, rest)) = tokens.split_first() else {
        bail!("empty command");
    };
    let command = command.as_str();

    // exec and exit pass their arguments through untouched.
    let raw_tail = matches!(command, "exec" | "!" | "exit");

    let mut opts = Options::default();
    let mut positional: Vec<String> = Vec::new();
    for token in rest {
        if !raw_tail && token.starts_with('-') && token.len() > 1 {
            ensure!(
                opts.parse_flag(token),
                "unknown flag `{token}` for `{command}`"
            );
            continue;
        }
        positional.push(token.clone());
    }

    if command == "mv" {
        opts.delete_source = true;
    }

    let root = |operation: Operation, args: Vec<Argument>, opts: Options| {
        Job::root(source_desc, command, operation, args, opts)
    };

    let job = match command {
        "ls" => match positional.len() {
            0 => root(Operation::ListBuckets, vec![], opts),
            1 => {
                let arg = classify(&positional[0])?;
                ensure!(arg.as_remote().is_some(), "ls takes an s3:// url");
                root(Operation::List, vec![arg], opts)
            }
            _ => bail!("ls takes at most one argument"),
        },
        "du" => {
            ensure!(positional.len() == 1, "du takes exactly one s3:// url");
            let arg = classify(&positional[0])?;
            ensure!(arg.as_remote().is_some(), "du takes an s3:// url");
            root(Operation::Size, vec![arg], opts)
        }
        "rm" | "batch-rm" => {
            ensure!(positional.len() == 1, "{command} takes exactly one argument");
            let arg = classify(&positional[0])?;
            let operation = match &arg {
                Argument::Remote { uri, .. } if uri.has_glob() || command == "batch-rm" => {
                    Operation::BatchDelete
                }
                Argument::Remote { .. } => Operation::Delete,
                Argument::Local(_) if command == "rm" => Operation::LocalDelete,
                _ => bail!("{command} takes an s3:// url"),
            };
            root(operation, vec![arg], opts)
        }
        "cp" | "mv" => {
            ensure!(positional.len() == 2, "{command} takes a source and a destination");
            let src = classify(&positional[0])?;
            let dst = classify(&positional[1])?;
            let operation = choose_copy(command, &src, &dst)?;
            root(operation, vec![src, dst], opts)
        }
        "get" => {
            ensure!(
                (1..=2).contains(&positional.len()),
                "get takes an s3:// url and an optional destination"
            );
            let src = classify(&positional[0])?;
            let Some(uri) = src.as_remote() else {
                bail!("get takes an s3:// url as its source");
            };
            let (operation, dst) = if uri.has_glob() {
                let dst = match positional.get(1) {
                    Some(p) => classify(p)?,
                    None => Argument::local("."),
                };
                (Operation::BatchDownload, dst)
            } else {
                let dst = match positional.get(1) {
                    Some(p) => classify(p)?,
                    None => Argument::local(keyglob::key_basename(&uri.key)),
                };
                (Operation::Download, dst)
            };
            ensure!(dst.as_local().is_some(), "get destination must be local");
            root(operation, vec![src, dst], opts)
        }
        "put" => {
            ensure!(positional.len() == 2, "put takes a source and an s3:// url");
            let src = classify(&positional[0])?;
            let dst = classify(&positional[1])?;
            ensure!(
                src.as_local().is_some() && dst.as_remote().is_some(),
                "put copies a local source to an s3:// url"
            );
            let operation = if is_batch_local_source(src.as_local().expect("checked")) {
                Operation::BatchUpload
            } else {
                Operation::Upload
            };
            root(operation, vec![src, dst], opts)
        }
        "exec" | "!" => {
            ensure!(!positional.is_empty(), "exec requires a program to run");
            let args = positional.into_iter().map(Argument::raw).collect();
            root(Operation::ShellExec, args, opts)
        }
        "exit" => {
            ensure!(positional.len() <= 1, "exit takes at most one code");
            let args = positional.into_iter().map(Argument::raw).collect();
            root(Operation::Abort, args, opts)
        }
        other => bail!("unknown command `{other}`"),
    };
    Ok(job)
}

fn classify(text: &str) -> Result<Argument> {
    if text.starts_with("s3://") {
        Ok(Argument::remote(S3Uri::from_str(text)?))
    } else {
        Ok(Argument::local(text))
    }
}

fn choose_copy(command: &str, src: &Argument, dst: &Argument) -> Result<Operation> {
    let operation = match (src, dst) {
        (Argument::Local(path), Argument::Remote { .. }) => {
            if is_batch_local_source(path) {
                Operation::BatchUpload
            } else {
                Operation::Upload
            }
        }
        (Argument::Remote { uri, .. }, Argument::Local(_)) => {
            if uri.has_glob() {
                Operation::BatchDownload
            } else {
                Operation::Download
            }
        }
        (Argument::Remote { uri, .. }, Argument::Remote { .. }) => {
            ensure!(
                !uri.has_glob(),
                "{command} between two s3:// urls does not support globs"
            );
            Operation::Copy
        }
        (Argument::Local(path), Argument::Local(_)) => {
            if is_batch_local_source(path) {
                Operation::BatchLocalCopy
            } else {
                Operation::LocalCopy
            }
        }
        _ => bail!("{command} arguments must be paths or s3:// urls"),
    };
    Ok(operation)
}

/// Globs fan out; so do existing directories.
fn is_batch_local_source(path: &Utf8Path) -> bool {
    keyglob::has_glob(path.as_str())
        || std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Job {
        parse_line(line).unwrap().unwrap()
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        assert!(parse_line("").unwrap().is_none());
        assert!(parse_line("   # upload the things").unwrap().is_none());
    }

    #[test]
    fn copy_operation_selection() {
        assert_eq!(
            parse("cp a.txt s3://b/a.txt").operation,
            Operation::Upload
        );
        assert_eq!(
            parse("cp s3://b/a.txt a.txt").operation,
            Operation::Download
        );
        assert_eq!(
            parse("cp s3://b/x/* out/").operation,
            Operation::BatchDownload
        );
        assert_eq!(
            parse("cp s3://b/a s3://b/c").operation,
            Operation::Copy
        );
        assert_eq!(parse("cp *.txt s3://b/p/").operation, Operation::BatchUpload);
        assert_eq!(parse("cp *.txt dst/").operation, Operation::BatchLocalCopy);
    }

    #[test]
    fn mv_sets_delete_source() {
        let job = parse("mv a.txt s3://b/a.txt");
        assert!(job.opts.delete_source);
        assert_eq!(job.command, "mv");
    }

    #[test]
    fn rm_variants() {
        assert_eq!(parse("rm s3://b/key").operation, Operation::Delete);
        assert_eq!(parse("rm s3://b/p/*").operation, Operation::BatchDelete);
        assert_eq!(parse("rm local.txt").operation, Operation::LocalDelete);
        assert_eq!(
            parse("batch-rm s3://b/prefix/").operation,
            Operation::BatchDelete
        );
    }

    #[test]
    fn flags_are_collected() {
        let job = parse("cp -n --parents -R src/* s3://b/p/");
        assert!(job.opts.if_not_exists);
        assert!(job.opts.parents);
        assert!(job.opts.recursive);
        assert_eq!(job.operation, Operation::BatchUpload);
        assert_eq!(job.args.len(), 2);
    }

    #[test]
    fn unknown_flag_is_an_error() {
        assert!(parse_line("cp --bogus a s3://b/a").is_err());
    }

    #[test]
    fn chaining_attaches_successors() {
        let job = parse("ls s3://b/ && du s3://b/p/ || exit 2");
        assert_eq!(job.operation, Operation::List);
        let success = job.success_next.as_ref().unwrap();
        assert_eq!(success.operation, Operation::Size);
        let fail = success.fail_next.as_ref().unwrap();
        assert_eq!(fail.operation, Operation::Abort);
        assert!(job.fail_next.is_none());
    }

    #[test]
    fn exec_keeps_raw_arguments() {
        let job = parse("exec touch -t 202401010000 marker");
        assert_eq!(job.operation, Operation::ShellExec);
        let texts: Vec<&str> = job.args.iter().map(|a| a.text()).collect();
        assert_eq!(texts, vec!["touch", "-t", "202401010000", "marker"]);
    }

    #[test]
    fn get_defaults_destination_to_basename() {
        let job = parse("get s3://b/path/file.bin");
        assert_eq!(job.operation, Operation::Download);
        assert_eq!(job.args[1].text(), "file.bin");
    }

    #[test]
    fn ls_without_arguments_lists_buckets() {
        assert_eq!(parse("ls").operation, Operation::ListBuckets);
        assert_eq!(parse("ls s3://b/*").operation, Operation::List);
    }
}
