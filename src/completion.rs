//! TAB completion: candidate collection, longest-common-prefix extension,
//! and the double-TAB candidate listing.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::editor::LineBuffer;
use crate::env::Environment;
use crate::terminal::{self, Prompt};

/// Two TABs within this window against the same prefix reveal the full
/// candidate list.
const DOUBLE_TAP_WINDOW: Duration = Duration::from_secs(1);

/// Completion logic plus the double-TAB memory.
///
/// The memory is reset whenever a command is accepted or an unambiguous
/// completion commits, so a stale first TAB never leaks into the next
/// command line.
pub struct CompletionEngine {
    builtin_names: Vec<&'static str>,
    env: Environment,
    last_tap: Option<(Instant, String)>,
}

impl CompletionEngine {
    pub fn new(builtin_names: Vec<&'static str>, env: Environment) -> Self {
        Self {
            builtin_names,
            env,
            last_tap: None,
        }
    }

    /// Forget the pending double-TAB state.
    pub fn reset(&mut self) {
        self.last_tap = None;
    }

    /// Handle one TAB press against the current buffer.
    pub fn complete<W: Write>(
        &mut self,
        buf: &mut LineBuffer,
        prompt: &Prompt,
        out: &mut W,
    ) -> io::Result<()> {
        let cursor = buf.cursor();
        if cursor == 0 {
            return Ok(());
        }
        let head = &buf.as_bytes()[..cursor];
        let word_start = last_word_start(head);
        let last_word = String::from_utf8_lossy(&head[word_start..]).into_owned();
        let first_word = head[..word_start].iter().all(u8::is_ascii_whitespace);

        let candidates = self.collect_candidates(&last_word, first_word);
        match candidates.len() {
            0 => {
                terminal::bell(out)?;
                self.reset();
            }
            1 => {
                let candidate = &candidates[0];
                let mut replacement = candidate.clone();
                if !candidate.ends_with('/') {
                    replacement.push(' ');
                }
                buf.replace_range(word_start, cursor, &replacement);
                terminal::refresh_line(out, prompt, buf.as_bytes(), buf.cursor())?;
                self.reset();
            }
            _ => {
                let lcp = longest_common_prefix(&candidates);
                if lcp.len() > last_word.len() {
                    buf.replace_range(word_start, cursor, &lcp);
                    terminal::refresh_line(out, prompt, buf.as_bytes(), buf.cursor())?;
                    self.last_tap = Some((Instant::now(), last_word));
                } else if self.tap_matches(&last_word) {
                    out.write_all(b"\r\n")?;
                    out.write_all(candidates.join("  ").as_bytes())?;
                    out.write_all(b"\r\n")?;
                    terminal::refresh_line(out, prompt, buf.as_bytes(), buf.cursor())?;
                    self.reset();
                } else {
                    terminal::bell(out)?;
                    self.last_tap = Some((Instant::now(), last_word));
                }
            }
        }
        Ok(())
    }

    fn tap_matches(&self, last_word: &str) -> bool {
        matches!(
            &self.last_tap,
            Some((at, prefix)) if at.elapsed() <= DOUBLE_TAP_WINDOW && prefix == last_word
        )
    }

    /// Sorted, deduplicated candidates for the word under completion.
    fn collect_candidates(&self, word: &str, first_word: bool) -> Vec<String> {
        let mut candidates = Vec::new();
        if let Some(slash) = word.rfind('/') {
            // path completion keeps the directory part in the candidate so
            // committing it rewrites the whole word
            let (dir_part, file_prefix) = word.split_at(slash + 1);
            directory_candidates(Path::new(dir_part), file_prefix, Some(dir_part), &mut candidates);
        } else if first_word {
            for name in &self.builtin_names {
                if name.starts_with(word) {
                    candidates.push((*name).to_string());
                }
            }
            if let Some(path_env) = self.env.search_path() {
                command_candidates(&path_env, word, &mut candidates);
            }
        } else {
            directory_candidates(Path::new("."), word, None, &mut candidates);
        }
        candidates.sort();
        candidates.dedup();
        candidates
    }
}

/// Entries of `dir` whose name starts with `prefix`, with `/` appended to
/// directories. `prepend` carries the typed directory part into the
/// candidate text. Unreadable directories yield nothing.
fn directory_candidates(
    dir: &Path,
    prefix: &str,
    prepend: Option<&str>,
    out: &mut Vec<String>,
) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(prefix) {
            continue;
        }
        let is_dir = fs::metadata(entry.path())
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        let mut candidate = match prepend {
            Some(dir_part) => format!("{dir_part}{name}"),
            None => name,
        };
        if is_dir {
            candidate.push('/');
        }
        out.push(candidate);
    }
}

/// Names of regular, anyone-executable files on `path_env` that start with
/// `prefix`.
fn command_candidates(path_env: &str, prefix: &str, out: &mut Vec<String>) {
    for dir in std::env::split_paths(path_env) {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(prefix) {
                continue;
            }
            let Ok(meta) = fs::metadata(entry.path()) else {
                continue;
            };
            if meta.is_file() && meta.permissions().mode() & 0o111 != 0 {
                out.push(name);
            }
        }
    }
}

/// Start of the word being completed: the byte after the last unescaped
/// blank in `head`.
fn last_word_start(head: &[u8]) -> usize {
    let mut start = 0;
    let mut i = 0;
    while i < head.len() {
        match head[i] {
            b'\\' => i += 2,
            b' ' | b'\t' => {
                start = i + 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    start.min(head.len())
}

/// Longest common byte prefix of the candidate set, trimmed back to a char
/// boundary so it can be spliced into the buffer as text.
pub fn longest_common_prefix(candidates: &[String]) -> String {
    let Some(first) = candidates.first() else {
        return String::new();
    };
    let mut len = first.len();
    for candidate in &candidates[1..] {
        let common = first
            .as_bytes()
            .iter()
            .zip(candidate.as_bytes())
            .take_while(|(a, b)| a == b)
            .count();
        len = len.min(common);
        if len == 0 {
            break;
        }
    }
    while len > 0 && !first.is_char_boundary(len) {
        len -= 1;
    }
    first[..len].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn make_unique_temp_dir(tag: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        p.push(format!("conch_{tag}_{}_{nanos}", std::process::id()));
        fs::create_dir_all(&p).unwrap();
        p
    }

    #[test]
    fn lcp_of_common_prefixes() {
        assert_eq!(longest_common_prefix(&strings(&["echo", "ech"])), "ech");
        assert_eq!(
            longest_common_prefix(&strings(&["exit", "echo", "env"])),
            "e"
        );
        assert_eq!(longest_common_prefix(&strings(&["abc"])), "abc");
        assert_eq!(longest_common_prefix(&[]), "");
        assert_eq!(longest_common_prefix(&strings(&["abc", "xyz"])), "");
    }

    #[test]
    fn lcp_is_maximal() {
        let candidates = strings(&["prefix_one", "prefix_two", "prefix_three"]);
        let lcp = longest_common_prefix(&candidates);
        assert!(candidates.iter().all(|c| c.starts_with(&lcp)));
        // one byte longer no longer covers every candidate
        let longer: Vec<_> = candidates
            .iter()
            .filter(|c| c.len() > lcp.len())
            .collect();
        assert!(longer
            .iter()
            .any(|c| !candidates.iter().all(|d| d.starts_with(&c[..lcp.len() + 1]))));
    }

    #[test]
    fn last_word_is_the_text_after_the_last_unescaped_blank() {
        assert_eq!(last_word_start(b"echo hel"), 5);
        assert_eq!(last_word_start(b"ec"), 0);
        assert_eq!(last_word_start(b"echo  "), 6);
        // the escaped blank does not split the word
        assert_eq!(last_word_start(br"cat my\ fi"), 4);
    }

    #[test]
    fn directory_candidates_mark_directories() {
        let dir = make_unique_temp_dir("dircand");
        fs::create_dir(dir.join("subdir")).unwrap();
        File::create(dir.join("subfile")).unwrap();
        File::create(dir.join("other")).unwrap();

        let mut out = Vec::new();
        directory_candidates(&dir, "sub", None, &mut out);
        out.sort();
        assert_eq!(out, ["subdir/", "subfile"]);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn path_candidates_keep_the_directory_prefix() {
        let dir = make_unique_temp_dir("pathcand");
        fs::create_dir(dir.join("nested")).unwrap();
        let typed = format!("{}/ne", dir.display());

        let engine = CompletionEngine::new(vec![], Environment::new());
        let found = engine.collect_candidates(&typed, false);
        assert_eq!(found, [format!("{}/nested/", dir.display())]);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn command_candidates_require_the_executable_bit() {
        let dir = make_unique_temp_dir("cmdcand");
        let exe = dir.join("runme");
        File::create(&exe).unwrap();
        let mut perms = fs::metadata(&exe).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&exe, perms).unwrap();
        File::create(dir.join("runnable_but_not")).unwrap();

        let mut out = Vec::new();
        command_candidates(&dir.display().to_string(), "run", &mut out);
        assert_eq!(out, ["runme"]);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn first_word_candidates_union_builtins_and_path() {
        let engine = CompletionEngine::new(vec!["echo", "exit"], Environment::new());
        let found = engine.collect_candidates("ech", true);
        // `echo` is both a builtin and (almost everywhere) a PATH entry;
        // the union deduplicates it
        assert_eq!(
            found.iter().filter(|c| c.as_str() == "echo").count(),
            1
        );
        let mut sorted = found.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(found, sorted);
    }

    #[test]
    fn single_candidate_appends_space_unless_directory() {
        let dir = make_unique_temp_dir("single");
        fs::create_dir(dir.join("only")).unwrap();

        let mut engine = CompletionEngine::new(vec![], Environment::new());
        let mut buf = LineBuffer::new();
        for b in format!("ls {}/on", dir.display()).bytes() {
            buf.insert(b);
        }
        let prompt = Prompt::new(Path::new("/"), false);
        let mut out = Vec::new();
        engine.complete(&mut buf, &prompt, &mut out).unwrap();
        // directory candidate: trailing slash, no space
        assert!(buf.text().ends_with("/only/"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn double_tap_lists_candidates_in_sorted_order() {
        let dir = make_unique_temp_dir("doubletap");
        File::create(dir.join("aaa_one")).unwrap();
        File::create(dir.join("aaa_two")).unwrap();

        let mut engine = CompletionEngine::new(vec![], Environment::new());
        let prompt = Prompt::new(Path::new("/"), false);
        let typed = format!("ls {}/aaa_", dir.display());

        let mut buf = LineBuffer::new();
        for b in typed.bytes() {
            buf.insert(b);
        }

        // first TAB: no extension possible, so bell plus recorded memory
        let mut first = Vec::new();
        engine.complete(&mut buf, &prompt, &mut first).unwrap();
        assert_eq!(first, b"\x07");
        assert_eq!(buf.text(), typed);

        // second TAB within the window: the full list
        let mut second = Vec::new();
        engine.complete(&mut buf, &prompt, &mut second).unwrap();
        let text = String::from_utf8_lossy(&second);
        let one = format!("{}/aaa_one", dir.display());
        let two = format!("{}/aaa_two", dir.display());
        assert!(text.contains(&format!("{one}  {two}")));
        assert_eq!(buf.text(), typed);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn multiple_candidates_extend_to_the_lcp() {
        let dir = make_unique_temp_dir("lcpext");
        File::create(dir.join("prefix_one")).unwrap();
        File::create(dir.join("prefix_two")).unwrap();

        let mut engine = CompletionEngine::new(vec![], Environment::new());
        let prompt = Prompt::new(Path::new("/"), false);
        let mut buf = LineBuffer::new();
        for b in format!("ls {}/pre", dir.display()).bytes() {
            buf.insert(b);
        }
        let mut out = Vec::new();
        engine.complete(&mut buf, &prompt, &mut out).unwrap();
        assert!(buf.text().ends_with("/prefix_"));
        assert_eq!(buf.cursor(), buf.len());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn no_candidates_ring_the_bell() {
        let dir = make_unique_temp_dir("nocand");
        let mut engine = CompletionEngine::new(vec![], Environment::new());
        let prompt = Prompt::new(Path::new("/"), false);
        let mut buf = LineBuffer::new();
        for b in format!("ls {}/zzz", dir.display()).bytes() {
            buf.insert(b);
        }
        let mut out = Vec::new();
        engine.complete(&mut buf, &prompt, &mut out).unwrap();
        assert_eq!(out, b"\x07");

        let _ = fs::remove_dir_all(dir);
    }
}
