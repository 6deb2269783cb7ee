//! Last-known-good revision resolution.
//!
//! A build status page lists one build per table row; the row holds a
//! 40-hex revision hash and, in the following cell, the build outcome. The
//! last-known-good revision is the first revision (in document order) that
//! starts a run of consecutive `Success` rows of a required length.

use crate::error::{Result, WebglCiError};
use regex::Regex;
use tracing::{debug, info};

/// Consecutive successful builds required before a revision is trusted.
pub const LKGR_SUCCESS_STREAK: usize = 3;

/// Outcome text of a successful build.
pub const SUCCESS_OUTCOME: &str = "Success";

/// One build row scraped from the status page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRow {
    pub hash: String,
    pub outcome: String,
}

impl BuildRow {
    pub fn is_success(&self) -> bool {
        self.outcome == SUCCESS_OUTCOME
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Start(String),
    End(String),
    Text(String),
}

/// Split HTML into start tags, end tags and non-blank text.
///
/// Attributes, comments, declarations and script/style bodies are dropped.
fn tokenize(html: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < html.len() {
        let rest = &html[pos..];

        if rest.starts_with("<!--") {
            pos += rest.find("-->").map(|i| i + 3).unwrap_or(rest.len());
            continue;
        }

        if !starts_markup(rest) {
            let next = rest
                .char_indices()
                .skip(1)
                .find(|&(i, _)| starts_markup(&rest[i..]))
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            push_text(&mut tokens, &rest[..next]);
            pos += next;
            continue;
        }

        let Some(close) = rest.find('>') else {
            push_text(&mut tokens, rest);
            break;
        };
        let inner = &rest[1..close];
        pos += close + 1;

        if inner.starts_with('!') || inner.starts_with('?') {
            continue;
        }
        if let Some(name) = inner.strip_prefix('/') {
            tokens.push(Token::End(tag_name(name)));
            continue;
        }

        let name = tag_name(inner);
        if name == "script" || name == "style" {
            let body = &html[pos..];
            let end_tag = format!("</{}", name);
            pos += match body.to_ascii_lowercase().find(&end_tag) {
                Some(i) => body[i..].find('>').map(|j| i + j + 1).unwrap_or(body.len()),
                None => body.len(),
            };
            continue;
        }
        tokens.push(Token::Start(name));
    }

    tokens
}

fn starts_markup(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('<')
        && chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'))
            .unwrap_or(false)
}

fn tag_name(inner: &str) -> String {
    inner
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn push_text(tokens: &mut Vec<Token>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        tokens.push(Token::Text(text.to_string()));
    }
}

/// Position of the scanner relative to the table rows.
#[derive(Debug)]
enum RowState {
    OutsideRow,
    AwaitingHash,
    AwaitingResult { hash: String, next_cell: bool },
}

/// Extract `(hash, outcome)` rows from a build status page.
pub fn parse_build_rows(html: &str) -> Result<Vec<BuildRow>> {
    let hash_re = Regex::new(r"\b([0-9a-f]{40})\b")?;
    let hash_cell = |text: &str| {
        hash_re.captures(text).map(|caps| RowState::AwaitingResult {
            hash: caps[1].to_string(),
            next_cell: false,
        })
    };

    let mut rows = Vec::new();
    let mut state = RowState::OutsideRow;

    for token in tokenize(html) {
        state = match (state, token) {
            (_, Token::Start(tag)) if tag == "tr" => RowState::AwaitingHash,
            (_, Token::End(tag)) if tag == "tr" => RowState::OutsideRow,
            (RowState::AwaitingResult { hash, .. }, Token::Start(tag) | Token::End(tag))
                if tag == "td" || tag == "th" =>
            {
                RowState::AwaitingResult {
                    hash,
                    next_cell: true,
                }
            }
            (RowState::AwaitingHash, Token::Text(text)) => {
                hash_cell(&text).unwrap_or(RowState::AwaitingHash)
            }
            (RowState::AwaitingResult { hash, next_cell: false }, Token::Text(text)) => {
                hash_cell(&text).unwrap_or(RowState::AwaitingResult {
                    hash,
                    next_cell: false,
                })
            }
            (RowState::AwaitingResult { hash, next_cell: true }, Token::Text(text)) => {
                let next = hash_cell(&text).unwrap_or(RowState::AwaitingHash);
                rows.push(BuildRow {
                    hash,
                    outcome: text,
                });
                next
            }
            (state, _) => state,
        };
    }

    debug!(rows = rows.len(), "parsed build status rows");
    Ok(rows)
}

/// Pick the first revision that starts a run of `streak` successful builds.
pub fn last_known_good(rows: &[BuildRow], streak: usize) -> Result<String> {
    let streak = streak.max(1);
    let mut candidate: Option<&str> = None;
    let mut run = 0;

    for row in rows {
        if row.is_success() {
            if run == 0 {
                candidate = Some(&row.hash);
            }
            run += 1;
            if run >= streak {
                if let Some(hash) = candidate {
                    info!(hash = %hash, streak, "resolved last known good revision");
                    return Ok(hash.to_string());
                }
            }
        } else {
            run = 0;
        }
    }

    Err(WebglCiError::NoSuccessStreak { streak })
}

/// Download a build status page.
///
/// `file://` URLs are read from disk, which allows saved pages to be used
/// offline.
pub async fn fetch_build_page(url: &str) -> Result<String> {
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(std::fs::read_to_string(path)?);
    }

    let http_err = |e: reqwest::Error| WebglCiError::Http {
        url: url.to_string(),
        message: e.to_string(),
    };

    let client = reqwest::Client::builder()
        .user_agent(concat!("webgl-ci/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(http_err)?;

    client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(http_err)?
        .text()
        .await
        .map_err(http_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(c: char) -> String {
        std::iter::repeat(c).take(40).collect()
    }

    fn row(c: char, outcome: &str) -> BuildRow {
        BuildRow {
            hash: hash(c),
            outcome: outcome.to_string(),
        }
    }

    fn page(rows: &[(String, &str)]) -> String {
        let mut html = String::from("<html><body><table>\n<tr><th>Revision</th><th>Result</th></tr>\n");
        for (h, outcome) in rows {
            html.push_str(&format!(
                "<tr>\n  <td><a href=\"/r/{h}\">{h}</a></td>\n  <td class=\"result\">{outcome}</td>\n</tr>\n"
            ));
        }
        html.push_str("</table></body></html>");
        html
    }

    #[test]
    fn test_tokenize_skips_comments_and_scripts() {
        let tokens = tokenize("<!-- x --><script>var a = '<tr>';</script><p>hi</p>");
        assert_eq!(
            tokens,
            vec![
                Token::Start("p".to_string()),
                Token::Text("hi".to_string()),
                Token::End("p".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_keeps_stray_angle_bracket_as_text() {
        let tokens = tokenize("<td>a < b</td>");
        assert_eq!(tokens[1], Token::Text("a < b".to_string()));
    }

    #[test]
    fn test_parse_build_rows() {
        let html = page(&[(hash('a'), "Success"), (hash('b'), "Failure")]);
        let rows = parse_build_rows(&html).unwrap();
        assert_eq!(rows, vec![row('a', "Success"), row('b', "Failure")]);
    }

    #[test]
    fn test_parse_ignores_text_outside_rows() {
        let html = format!("<p>{}</p><table><tr><td>{}</td><td>Success</td></tr></table>", hash('c'), hash('d'));
        let rows = parse_build_rows(&html).unwrap();
        assert_eq!(rows, vec![row('d', "Success")]);
    }

    #[test]
    fn test_parse_row_without_result_cell() {
        let html = format!("<table><tr><td>{}</td></tr></table>", hash('e'));
        assert!(parse_build_rows(&html).unwrap().is_empty());
    }

    #[test]
    fn test_last_known_good_first_streak() {
        let rows = vec![
            row('1', "Failure"),
            row('2', "Success"),
            row('3', "Success"),
            row('4', "Success"),
            row('5', "Success"),
        ];
        assert_eq!(last_known_good(&rows, 3).unwrap(), hash('2'));
    }

    #[test]
    fn test_last_known_good_resets_on_failure() {
        let rows = vec![
            row('1', "Success"),
            row('2', "Success"),
            row('3', "Exception"),
            row('4', "Success"),
            row('5', "Success"),
            row('6', "Success"),
        ];
        assert_eq!(last_known_good(&rows, 3).unwrap(), hash('4'));
    }

    #[test]
    fn test_last_known_good_without_streak_fails() {
        let rows = vec![
            row('1', "Success"),
            row('2', "Success"),
            row('3', "Failure"),
            row('4', "Success"),
        ];
        assert!(matches!(
            last_known_good(&rows, 3),
            Err(WebglCiError::NoSuccessStreak { streak: 3 })
        ));
        assert!(last_known_good(&[], LKGR_SUCCESS_STREAK).is_err());
    }

    #[tokio::test]
    async fn test_fetch_build_page_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("builds.html");
        std::fs::write(&path, page(&[(hash('f'), "Success")])).unwrap();

        let html = fetch_build_page(&format!("file://{}", path.display()))
            .await
            .unwrap();
        assert_eq!(parse_build_rows(&html).unwrap(), vec![row('f', "Success")]);
    }

    #[test]
    fn test_end_to_end_from_html() {
        let html = page(&[
            (hash('a'), "Failure"),
            (hash('b'), "Success"),
            (hash('c'), "Success"),
            (hash('d'), "Success"),
        ]);
        let rows = parse_build_rows(&html).unwrap();
        assert_eq!(last_known_good(&rows, LKGR_SUCCESS_STREAK).unwrap(), hash('b'));
    }
}
