//! Argument handling for the `kbq` binary.

use kbq_core::types::{QueryRequest, QueryResult};

pub const USAGE: &str = "Usage: kbq <command> [args...]

Commands:
  query <question> [--context TEXT] [--top-k N] [--diagnostic]
  stdin     read one JSON request from stdin
  status    print service state and index size";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Query(QueryRequest),
    Stdin,
    Status,
}

/// Parse arguments after the program name.
pub fn parse_args(args: &[String]) -> Result<Command, String> {
    let Some((cmd, rest)) = args.split_first() else { return Err("missing command".to_string()) };
    match cmd.as_str() {
        "query" => parse_query(rest).map(Command::Query),
        "stdin" => Ok(Command::Stdin),
        "status" => Ok(Command::Status),
        other => Err(format!("unknown command: {other}")),
    }
}

fn parse_query(args: &[String]) -> Result<QueryRequest, String> {
    let mut question: Option<&str> = None;
    let mut request = QueryRequest::new("");
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--context" => {
                i += 1;
                let value = args.get(i).ok_or("--context requires a value")?;
                request.context = Some(value.clone());
            }
            "--top-k" => {
                i += 1;
                let value = args.get(i).ok_or("--top-k requires a number")?;
                request.top_k = value.parse().map_err(|_| format!("--top-k requires a number, got '{value}'"))?;
            }
            "--diagnostic" => request.diagnostic = true,
            flag if flag.starts_with("--") => return Err(format!("unknown option: {flag}")),
            text if question.is_none() => question = Some(text),
            extra => return Err(format!("unexpected argument: {extra}")),
        }
        i += 1;
    }
    request.question = question.ok_or("query requires a question")?.to_string();
    Ok(request)
}

/// Decode a JSON request. Malformed input becomes an error result for the caller to print.
pub fn parse_request_json(input: &str) -> Result<QueryRequest, QueryResult> {
    serde_json::from_str(input).map_err(|e| QueryResult {
        error: Some(format!("invalid request: {e}")),
        ..QueryResult::new(String::new(), Vec::new())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> { list.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn parses_query_with_options() {
        let cmd = parse_args(&args(&["query", "how to build trust", "--context", "new job", "--top-k", "3", "--diagnostic"]))
            .expect("parse");
        let expected = QueryRequest::new("how to build trust").with_context("new job").with_top_k(3).with_diagnostic(true);
        assert_eq!(cmd, Command::Query(expected));
    }

    #[test]
    fn rejects_bad_query_arguments() {
        assert!(parse_args(&args(&["query"])).is_err());
        assert!(parse_args(&args(&["query", "q", "--top-k", "many"])).is_err());
        assert!(parse_args(&args(&["query", "q", "--verbose"])).is_err());
        assert!(parse_args(&args(&["ingest"])).is_err());
        assert!(parse_args(&[]).is_err());
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse_args(&args(&["stdin"])), Ok(Command::Stdin));
        assert_eq!(parse_args(&args(&["status"])), Ok(Command::Status));
    }

    #[test]
    fn json_request_accepts_legacy_field_names() {
        let request = parse_request_json(r#"{"query":"q","context":"c","diagnostic_mode":true}"#).expect("request");
        assert_eq!(request, QueryRequest::new("q").with_context("c").with_diagnostic(true));
    }

    #[test]
    fn malformed_json_becomes_error_result() {
        let result = parse_request_json("{not json").expect_err("must fail");
        assert!(result.error.as_deref().is_some_and(|e| e.starts_with("invalid request")));
        assert_eq!(result.sources_count, 0);
        assert!(result.references.is_empty());
    }
}
