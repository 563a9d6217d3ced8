//! Parsers for the daemon's human-readable listing output.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::Error;
use crate::models::{Conflict, Endpoint, Session, SessionStatus, Side};

fn conflict_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\((alpha|beta|α|β)\)\s+(.+)$").expect("Invalid regex"))
}

fn digest_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[0-9a-fA-F]{8,}\b").expect("Invalid regex"))
}

fn created_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Created session\s+(\S+)").expect("Invalid regex"))
}

#[derive(Default)]
struct SessionDraft {
    name: String,
    identifier: Option<String>,
    status: Option<String>,
    alpha: Endpoint,
    beta: Endpoint,
    conflicts: Vec<Conflict>,
}

/// One session block of a listing, with the conflicts it reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionListing {
    pub session: Session,
    pub conflicts: Vec<Conflict>,
}

/// Whether a daemon endpoint URL names a remote (`[user@]host:path`) rather
/// than a local path.
pub fn is_remote_url(url: &str) -> bool {
    let Some((prefix, _)) = url.split_once(':') else {
        return false;
    };
    // A single letter before the colon is a Windows drive.
    prefix.len() > 1 && !prefix.contains(['/', '\\'])
}

impl SessionDraft {
    fn endpoint_mut(&mut self, side: Side) -> &mut Endpoint {
        match side {
            Side::Alpha => &mut self.alpha,
            Side::Beta => &mut self.beta,
        }
    }

    fn finish(self) -> Result<SessionListing, Error> {
        let identifier = self.identifier.ok_or_else(|| {
            Error::Parse(format!("session '{}' has no identifier", self.name))
        })?;

        let status = match self.status.as_deref() {
            None => SessionStatus::Connecting,
            Some(text) => SessionStatus::from_daemon_text(text).unwrap_or_else(|| {
                tracing::warn!(session = %self.name, status = %text, "Unrecognized session status");
                SessionStatus::Error
            }),
        };

        let mut listing = SessionListing {
            session: Session {
                identifier,
                name: self.name,
                status,
                alpha: self.alpha,
                beta: self.beta,
            },
            conflicts: self.conflicts,
        };
        // Sessions created remote-first still report local as alpha.
        let session = &mut listing.session;
        if is_remote_url(&session.alpha.url) && !is_remote_url(&session.beta.url) {
            std::mem::swap(&mut session.alpha, &mut session.beta);
            for conflict in &mut listing.conflicts {
                std::mem::swap(&mut conflict.alpha_digest, &mut conflict.beta_digest);
            }
        }
        Ok(listing)
    }
}

fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.strip_prefix(key)
        .and_then(|rest| rest.strip_prefix(':'))
        .map(str::trim)
}

fn flush(draft: Option<SessionDraft>, listings: &mut Vec<SessionListing>) {
    let Some(draft) = draft else {
        return;
    };
    match draft.finish() {
        Ok(listing) => listings.push(listing),
        Err(error) => tracing::warn!("Skipping session block: {error}"),
    }
}

/// Parse `sync list` or `sync list --long` output into session blocks.
///
/// Blocks without an identifier are skipped. Sessions without a status line
/// (no scan yet) are reported as connecting. Endpoints are reported with
/// the local side as alpha, whatever order the daemon used.
pub fn parse_listing(output: &str) -> Vec<SessionListing> {
    let mut listings = Vec::new();
    let mut current: Option<SessionDraft> = None;
    let mut section: Option<Side> = None;

    for raw in output.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("---") {
            continue;
        }

        if let Some(name) = field(line, "Name") {
            flush(current.take(), &mut listings);
            current = Some(SessionDraft {
                name: name.to_string(),
                ..SessionDraft::default()
            });
            section = None;
            continue;
        }

        let Some(draft) = current.as_mut() else {
            tracing::debug!(line = %line, "Ignoring daemon output outside a session block");
            continue;
        };

        if let Some((side, path, digest)) = parse_conflict_line(line) {
            add_conflict(&mut draft.conflicts, side, path, digest);
        } else if let Some(identifier) = field(line, "Identifier") {
            draft.identifier = Some(identifier.to_string()).filter(|id| !id.is_empty());
        } else if let Some(status) = field(line, "Status") {
            draft.status = Some(status.to_string());
            section = None;
        } else if field(line, "Alpha").is_some() {
            section = Some(Side::Alpha);
        } else if field(line, "Beta").is_some() {
            section = Some(Side::Beta);
        } else if field(line, "Conflicts").is_some() {
            section = None;
        } else if let Some(side) = section {
            if let Some(url) = field(line, "URL") {
                draft.endpoint_mut(side).url = url.to_string();
            } else if let Some(connected) = field(line, "Connected") {
                draft.endpoint_mut(side).connected = connected.eq_ignore_ascii_case("yes");
            }
        }
    }

    flush(current, &mut listings);
    listings
}

/// Sessions of a listing, without their conflicts.
pub fn parse_sessions(output: &str) -> Vec<Session> {
    parse_listing(output)
        .into_iter()
        .map(|listing| listing.session)
        .collect()
}

/// Split `path (details)` into the path and the trailing parenthetical,
/// honouring nested parentheses inside the details.
fn split_trailing_details(text: &str) -> (&str, Option<&str>) {
    let text = text.trim();
    if !text.ends_with(')') {
        return (text, None);
    }

    let mut depth = 0usize;
    for (idx, ch) in text.char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let path = text[..idx].trim_end();
                    if path.is_empty() {
                        return (text, None);
                    }
                    return (path, Some(&text[idx + 1..text.len() - 1]));
                }
            }
            _ => {}
        }
    }
    (text, None)
}

fn parse_conflict_line(line: &str) -> Option<(Side, &str, Option<String>)> {
    let captures = conflict_line_regex().captures(line)?;
    let side = match captures.get(1)?.as_str() {
        "alpha" | "α" => Side::Alpha,
        _ => Side::Beta,
    };
    let (path, details) = split_trailing_details(captures.get(2)?.as_str());
    let digest = details
        .and_then(|details| digest_regex().find(details))
        .map(|found| found.as_str().to_string());
    Some((side, path, digest))
}

/// Alpha and beta lines for the same path merge into one conflict, in order
/// of first appearance.
fn add_conflict(conflicts: &mut Vec<Conflict>, side: Side, path: &str, digest: Option<String>) {
    let index = conflicts
        .iter()
        .position(|conflict| conflict.path == path)
        .unwrap_or_else(|| {
            conflicts.push(Conflict {
                path: path.to_string(),
                alpha_digest: None,
                beta_digest: None,
            });
            conflicts.len() - 1
        });

    let entry = &mut conflicts[index];
    match side {
        Side::Alpha => entry.alpha_digest = entry.alpha_digest.take().or(digest),
        Side::Beta => entry.beta_digest = entry.beta_digest.take().or(digest),
    }
}

/// Conflicts of `sync list --long <name>` output.
pub fn parse_conflicts(output: &str) -> Vec<Conflict> {
    parse_listing(output)
        .into_iter()
        .flat_map(|listing| listing.conflicts)
        .collect()
}

/// Pull the identifier out of `sync create` output, if it printed one.
pub fn parse_created_identifier(output: &str) -> Option<String> {
    created_regex()
        .captures(output)
        .map(|captures| captures[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LISTING: &str = "\
--------------------------------------------------------------------------------
Name: proj
Identifier: sync_2aWbCpKQ
Labels: None
Alpha:
\tURL: /home/u/proj
\tConnected: Yes
Beta:
\tURL: u@mutagen-proj:/r
\tConnected: No
Status: [Paused]
--------------------------------------------------------------------------------
Name: docs
Identifier: sync_9xYz
Alpha:
\tURL: /home/u/docs
\tConnected: Yes
Beta:
\tURL: u@mutagen-docs:/d
\tConnected: Yes
Status: Watching for changes
--------------------------------------------------------------------------------
";

    #[test]
    fn parses_paused_session_with_disconnected_beta() {
        let sessions = parse_sessions(LISTING);
        assert_eq!(sessions.len(), 2);

        let proj = &sessions[0];
        assert_eq!(proj.name, "proj");
        assert_eq!(proj.identifier, "sync_2aWbCpKQ");
        assert_eq!(proj.status, SessionStatus::Paused);
        assert_eq!(proj.alpha.url, "/home/u/proj");
        assert!(proj.alpha.connected);
        assert_eq!(proj.beta.url, "u@mutagen-proj:/r");
        assert!(!proj.beta.connected);

        assert_eq!(sessions[1].status, SessionStatus::Watching);
    }

    #[test]
    fn missing_status_defaults_to_connecting() {
        let output = "Name: fresh\nIdentifier: sync_1\nAlpha:\n\tURL: /l\n";
        let sessions = parse_sessions(output);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, SessionStatus::Connecting);
        assert!(!sessions[0].beta.connected);
        assert_eq!(sessions[0].beta.url, "");
    }

    #[test]
    fn block_without_identifier_is_skipped() {
        let output = "Name: broken\nStatus: Watching\nName: ok\nIdentifier: sync_ok\nStatus: Scanning files\n";
        let sessions = parse_sessions(output);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].name, "ok");
        assert_eq!(sessions[0].status, SessionStatus::Scanning);
    }

    #[test]
    fn garbage_lines_do_not_break_parsing() {
        let output = "Welcome!\n:::\nName: ok\nIdentifier: sync_ok\nURL: stray\nAlpha:\n\tConnected: maybe\n\tnonsense\nStatus: Pondering the universe\n";
        let sessions = parse_sessions(output);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].alpha.url, "");
        assert!(!sessions[0].alpha.connected);
        assert_eq!(sessions[0].status, SessionStatus::Error);
    }

    #[test]
    fn empty_output_has_no_sessions() {
        assert!(parse_sessions("").is_empty());
        assert!(parse_sessions("No synchronization sessions found\n").is_empty());
    }

    #[test]
    fn conflicts_section_ends_endpoint_parsing() {
        let output = "Name: c\nIdentifier: sync_c\nBeta:\n\tURL: u@h:/r\n\tConnected: Yes\nConflicts:\n\t(alpha) a.txt (File (0123abcd))\n\tURL: ignored\nStatus: Watching for changes\n";
        let sessions = parse_sessions(output);
        assert_eq!(sessions[0].beta.url, "u@h:/r");
        assert!(sessions[0].beta.connected);
    }

    #[test]
    fn parses_and_merges_conflicts_by_path() {
        let output = "\
Name: proj
Identifier: sync_proj
Alpha:
\tURL: /home/u/proj
Beta:
\tURL: u@mutagen-proj:/r
Conflicts:
\t(alpha) src/main.rs (File (5f0e2c8a91d4))
\t(beta) src/main.rs (File (7c1d3e9b0a22))
\t(α) notes/todo list.md (File (abcdef0123))
\t(β) notes/todo list.md (<non-existent>)
\t(beta) README
";
        let conflicts = parse_conflicts(output);
        assert_eq!(
            conflicts,
            vec![
                Conflict {
                    path: "src/main.rs".to_string(),
                    alpha_digest: Some("5f0e2c8a91d4".to_string()),
                    beta_digest: Some("7c1d3e9b0a22".to_string()),
                },
                Conflict {
                    path: "notes/todo list.md".to_string(),
                    alpha_digest: Some("abcdef0123".to_string()),
                    beta_digest: None,
                },
                Conflict {
                    path: "README".to_string(),
                    alpha_digest: None,
                    beta_digest: None,
                },
            ]
        );
    }

    #[test]
    fn remote_first_sessions_report_local_as_alpha() {
        let output = "\
Name: mirror
Identifier: sync_m
Alpha:
\tURL: u@mutagen-mirror:/r
\tConnected: No
Beta:
\tURL: /home/u/mirror
\tConnected: Yes
Conflicts:
\t(alpha) a.txt (File (aaaaaaaa11))
\t(beta) a.txt (File (bbbbbbbb22))
Status: Watching for changes
";
        let listings = parse_listing(output);
        assert_eq!(listings.len(), 1);
        let SessionListing { session, conflicts } = &listings[0];
        assert_eq!(session.alpha.url, "/home/u/mirror");
        assert!(session.alpha.connected);
        assert_eq!(session.beta.url, "u@mutagen-mirror:/r");
        assert!(!session.beta.connected);
        assert_eq!(conflicts[0].alpha_digest.as_deref(), Some("bbbbbbbb22"));
        assert_eq!(conflicts[0].beta_digest.as_deref(), Some("aaaaaaaa11"));
    }

    #[test]
    fn long_listing_groups_conflicts_per_session() {
        let output = "\
Name: a
Identifier: sync_a
Conflicts:
\t(alpha) x.txt (File (0123abcd))
Status: Watching for changes
Name: b
Identifier: sync_b
Status: Watching for changes
";
        let listings = parse_listing(output);
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].conflicts.len(), 1);
        assert_eq!(listings[0].conflicts[0].path, "x.txt");
        assert!(listings[1].conflicts.is_empty());
    }

    #[test]
    fn remote_urls_are_recognised_by_shape() {
        assert!(is_remote_url("u@mutagen-proj:/srv/app"));
        assert!(is_remote_url("host:relative/path"));
        assert!(!is_remote_url("/home/u/proj"));
        assert!(!is_remote_url("C:\\Users\\u\\proj"));
        assert!(!is_remote_url("./dir:with-colon"));
    }

    #[test]
    fn no_conflict_lines_means_no_conflicts() {
        assert!(parse_conflicts("Name: x\nStatus: Watching for changes\n").is_empty());
    }

    #[test]
    fn created_identifier_is_extracted() {
        assert_eq!(
            parse_created_identifier("Created session sync_AbC123\n"),
            Some("sync_AbC123".to_string())
        );
        assert_eq!(parse_created_identifier(""), None);
    }
}
