//! Following container output on the caller's terminal.

use std::sync::LazyLock;

use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// CSI and OSC escape sequences plus stray single-character escapes.
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b(?:\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)|[@-Z\\-_])")
        .expect("ANSI escape pattern is valid")
});

/// Remove terminal escape sequences from a line of server output.
pub fn strip_ansi(line: &str) -> std::borrow::Cow<'_, str> {
    ANSI_ESCAPE.replace_all(line, "")
}

/// Copy `reader` line by line to `writer` with escapes stripped.
///
/// Returns the number of lines written once the reader reaches EOF.
pub async fn follow_output<R, W>(reader: R, mut writer: W) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut count = 0;

    while let Some(line) = lines.next_line().await? {
        writer.write_all(strip_ansi(&line).as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_color_codes() {
        let line = "\x1b[0m\x1b[32m12:00:01,123 INFO  [org.jboss.as] WFLYSRV0025: started\x1b[0m";
        assert_eq!(
            strip_ansi(line),
            "12:00:01,123 INFO  [org.jboss.as] WFLYSRV0025: started"
        );
    }

    #[test]
    fn test_plain_line_is_untouched() {
        let line = "Admin console listening on http://127.0.0.1:9990";
        assert!(matches!(strip_ansi(line), std::borrow::Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_osc_title_sequence() {
        assert_eq!(strip_ansi("\x1b]0;keycloak\x07ready"), "ready");
    }

    #[tokio::test]
    async fn test_follow_output_strips_each_line() {
        let input: &[u8] = b"\x1b[1mone\x1b[0m\ntwo\n";
        let mut out = Vec::new();

        let count = follow_output(input, &mut out).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "one\ntwo\n");
    }
}
