use thiserror::Error;

use crate::launch::{Geometry, LaunchRequest, TabSpec, Visibility, WindowSpec};

/// A rejected command line: the offending token and why.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("bad option '{token}': {reason}")]
pub struct ParseError {
    pub token: String,
    pub reason: String,
}

impl ParseError {
    fn new(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            reason: reason.into(),
        }
    }
}

/// Parse an argument vector (without argv0) into a `LaunchRequest`.
///
/// `--window` and `--tab` open new scopes; flags bind to the current scope.
/// The first `--window` in argv binds to the implicit first window if it is
/// still untouched, and the first `--tab` inside a window binds to that
/// window's implicit first tab if untouched, so `tern --tab --title=x`
/// opens exactly one tab. `--` (or `-e`) hands the rest of argv verbatim to
/// the current tab and stops scanning.
pub fn parse(args: &[String]) -> Result<LaunchRequest, ParseError> {
    let mut req = LaunchRequest::default();
    let mut seen_window_boundary = false;
    let mut seen_tab_boundary = false;

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();

        // Execute boundary: everything after it is the tab's command.
        if arg == "--" || arg == "-e" || arg == "--execute" {
            let rest: Vec<String> = args[i + 1..].to_vec();
            current_tab(&mut req).command = rest;
            break;
        }

        let (name, inline) = split_flag(arg);
        match name {
            "--window" => {
                no_value(arg, inline)?;
                let cur = current_window(&mut req);
                if seen_window_boundary || *cur != WindowSpec::default() {
                    req.windows.push(WindowSpec::default());
                    seen_tab_boundary = false;
                }
                seen_window_boundary = true;
            }
            "--tab" => {
                no_value(arg, inline)?;
                let cur = current_window(&mut req);
                if seen_tab_boundary || cur.tabs.last() != Some(&TabSpec::default()) {
                    cur.tabs.push(TabSpec::default());
                }
                seen_tab_boundary = true;
            }

            // Terminal / global flags, recognized anywhere before `--`.
            "--help" | "-h" => {
                no_value(arg, inline)?;
                req.show_help = true;
            }
            "--version" | "-V" => {
                no_value(arg, inline)?;
                req.show_version = true;
            }
            "--show-colors" => {
                no_value(arg, inline)?;
                req.show_colors = true;
            }
            "--disable-server" => {
                no_value(arg, inline)?;
                req.disable_server = true;
            }

            // Per-tab flags.
            "--hold" | "-H" => {
                no_value(arg, inline)?;
                current_tab(&mut req).hold = true;
            }
            "--title" | "-T" => {
                let v = take_value(args, &mut i, name, inline)?;
                current_tab(&mut req).title = Some(v);
            }
            "--working-directory" | "-d" => {
                let v = take_value(args, &mut i, name, inline)?;
                current_tab(&mut req).working_directory = Some(v.into());
            }
            "--command" => {
                let v = take_value(args, &mut i, name, inline)?;
                let words = tokenize(&v)
                    .map_err(|reason| ParseError::new(name, reason))?;
                current_tab(&mut req).command = words;
            }
            // Only the inline form lands here; the bare form is the execute
            // boundary above.
            "--execute" => {
                return Err(ParseError::new(
                    arg,
                    "takes no inline value; use --execute CMD ARGS... or -- CMD ARGS...",
                ));
            }

            // Per-window flags.
            "--geometry" => {
                let v = take_value(args, &mut i, name, inline)?;
                let geometry: Geometry = v
                    .parse()
                    .map_err(|reason: String| ParseError::new(name, reason))?;
                current_window(&mut req).geometry = Some(geometry);
            }
            "--role" => {
                let v = take_value(args, &mut i, name, inline)?;
                current_window(&mut req).role = Some(v);
            }
            "--display" => {
                let v = take_value(args, &mut i, name, inline)?;
                current_window(&mut req).display = Some(v);
            }
            "--icon" => {
                let v = take_value(args, &mut i, name, inline)?;
                current_window(&mut req).icon = Some(v);
            }
            "--startup-id" => {
                let v = take_value(args, &mut i, name, inline)?;
                current_window(&mut req).startup_id = Some(v);
            }
            "--sm-client-id" => {
                let v = take_value(args, &mut i, name, inline)?;
                current_window(&mut req).sm_client_id = Some(v);
            }
            "--fullscreen" | "-F" => {
                no_value(arg, inline)?;
                current_window(&mut req).fullscreen = true;
            }
            "--maximize" | "-M" => {
                no_value(arg, inline)?;
                current_window(&mut req).maximize = true;
            }
            "--show-menubar" => {
                no_value(arg, inline)?;
                current_window(&mut req).menubar = Visibility::Show;
            }
            "--hide-menubar" => {
                no_value(arg, inline)?;
                current_window(&mut req).menubar = Visibility::Hide;
            }
            "--show-toolbar" => {
                no_value(arg, inline)?;
                current_window(&mut req).toolbar = Visibility::Show;
            }
            "--hide-toolbar" => {
                no_value(arg, inline)?;
                current_window(&mut req).toolbar = Visibility::Hide;
            }
            "--show-borders" => {
                no_value(arg, inline)?;
                current_window(&mut req).borders = Visibility::Show;
            }
            "--hide-borders" => {
                no_value(arg, inline)?;
                current_window(&mut req).borders = Visibility::Hide;
            }
            "--drop-down" => {
                no_value(arg, inline)?;
                let cur = current_window(&mut req);
                if cur.reuse_last_window {
                    return Err(ParseError::new(
                        name,
                        "cannot combine --drop-down with --reuse-last-window",
                    ));
                }
                cur.is_drop_down = true;
            }
            "--reuse-last-window" => {
                no_value(arg, inline)?;
                let cur = current_window(&mut req);
                if cur.is_drop_down {
                    return Err(ParseError::new(
                        name,
                        "cannot combine --reuse-last-window with --drop-down",
                    ));
                }
                cur.reuse_last_window = true;
            }

            _ if arg.starts_with('-') => {
                return Err(ParseError::new(arg, "unknown option"));
            }
            _ => {
                return Err(ParseError::new(
                    arg,
                    "unexpected argument (use -- to pass a command)",
                ));
            }
        }
        i += 1;
    }

    Ok(req)
}

fn current_window(req: &mut LaunchRequest) -> &mut WindowSpec {
    req.windows.last_mut().unwrap()
}

fn current_tab(req: &mut LaunchRequest) -> &mut TabSpec {
    current_window(req).tabs.last_mut().unwrap()
}

/// Split `--name=value` at the first `=`.
fn split_flag(arg: &str) -> (&str, Option<&str>) {
    if arg.starts_with("--") {
        match arg.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (arg, None),
        }
    } else {
        (arg, None)
    }
}

/// Reject an inline value on a flag that takes none.
fn no_value(arg: &str, inline: Option<&str>) -> Result<(), ParseError> {
    match inline {
        Some(_) => Err(ParseError::new(arg, "this option does not take a value")),
        None => Ok(()),
    }
}

/// Fetch a flag's value, either inline (`--flag=v`) or as the next token.
fn take_value(
    args: &[String],
    i: &mut usize,
    name: &str,
    inline: Option<&str>,
) -> Result<String, ParseError> {
    if let Some(v) = inline {
        return Ok(v.to_string());
    }
    *i += 1;
    match args.get(*i) {
        Some(v) => Ok(v.clone()),
        None => Err(ParseError::new(name, "missing value")),
    }
}

// ---------------------------------------------------------------------------
// Canonical re-serialization
// ---------------------------------------------------------------------------

/// Serialize a request back into argv tokens such that `parse(to_argv(r))`
/// equals `r`. Boundaries are always explicit; tab commands are carried via
/// `--command` since `--` could only express the very last tab.
pub fn to_argv(req: &LaunchRequest) -> Vec<String> {
    let mut out = Vec::new();
    if req.show_help {
        out.push("--help".to_string());
    }
    if req.show_version {
        out.push("--version".to_string());
    }
    if req.show_colors {
        out.push("--show-colors".to_string());
    }
    if req.disable_server {
        out.push("--disable-server".to_string());
    }

    for w in &req.windows {
        out.push("--window".to_string());
        if let Some(d) = &w.display {
            out.push(format!("--display={}", d));
        }
        if let Some(g) = &w.geometry {
            out.push(format!("--geometry={}", g));
        }
        if let Some(r) = &w.role {
            out.push(format!("--role={}", r));
        }
        if let Some(s) = &w.startup_id {
            out.push(format!("--startup-id={}", s));
        }
        if let Some(s) = &w.sm_client_id {
            out.push(format!("--sm-client-id={}", s));
        }
        if let Some(ic) = &w.icon {
            out.push(format!("--icon={}", ic));
        }
        if w.fullscreen {
            out.push("--fullscreen".to_string());
        }
        if w.maximize {
            out.push("--maximize".to_string());
        }
        if w.is_drop_down {
            out.push("--drop-down".to_string());
        }
        if w.reuse_last_window {
            out.push("--reuse-last-window".to_string());
        }
        push_visibility(&mut out, w.menubar, "menubar");
        push_visibility(&mut out, w.toolbar, "toolbar");
        push_visibility(&mut out, w.borders, "borders");

        for t in &w.tabs {
            out.push("--tab".to_string());
            if let Some(dir) = &t.working_directory {
                out.push(format!("--working-directory={}", dir.display()));
            }
            if let Some(title) = &t.title {
                out.push(format!("--title={}", title));
            }
            if t.hold {
                out.push("--hold".to_string());
            }
            if !t.command.is_empty() {
                out.push(format!("--command={}", quote_join(&t.command)));
            }
        }
    }
    out
}

fn push_visibility(out: &mut Vec<String>, v: Visibility, what: &str) {
    match v {
        Visibility::Default => {}
        Visibility::Show => out.push(format!("--show-{}", what)),
        Visibility::Hide => out.push(format!("--hide-{}", what)),
    }
}

// ---------------------------------------------------------------------------
// Word splitting for --command values
// ---------------------------------------------------------------------------

/// Split a `--command` value into words, honoring single and double quotes
/// and backslash escapes inside double quotes.
pub fn tokenize(input: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = input.chars().peekable();
    let mut in_quote = false;
    let mut quote_char = '"';

    while let Some(ch) = chars.next() {
        if in_quote {
            if ch == quote_char {
                in_quote = false;
            } else if ch == '\\' && quote_char == '"' {
                match chars.next() {
                    Some('\\') => current.push('\\'),
                    Some('"') => current.push('"'),
                    Some(other) => {
                        current.push('\\');
                        current.push(other);
                    }
                    None => current.push('\\'),
                }
            } else {
                current.push(ch);
            }
        } else if ch == '"' || ch == '\'' {
            in_quote = true;
            quote_char = ch;
            quoted = true;
        } else if ch.is_whitespace() {
            if !current.is_empty() || quoted {
                words.push(std::mem::take(&mut current));
            }
            quoted = false;
        } else {
            current.push(ch);
        }
    }

    if in_quote {
        return Err(format!("unterminated quote in '{}'", input));
    }
    if !current.is_empty() || quoted {
        words.push(current);
    }
    Ok(words)
}

/// Join command words into a single `--command` value that `tokenize`
/// splits back into the same words.
pub fn quote_join(words: &[String]) -> String {
    let mut out = String::new();
    for (idx, word) in words.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        let needs_quotes = word.is_empty()
            || word
                .chars()
                .any(|c| c.is_whitespace() || c == '"' || c == '\'' || c == '\\');
        if needs_quotes {
            out.push('"');
            for c in word.chars() {
                if c == '"' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        } else {
            out.push_str(word);
        }
    }
    out
}
