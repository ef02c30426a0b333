/// Harness Synthesizer - turns `(code, tests)` into one compilable program
///
/// **Output layout:**
/// 1. The user's code, with a user-defined `main` renamed when tests exist
/// 2. `const USER_CODE: &str = <original code as a literal>;`
/// 3. A generated `main` that calls the renamed entry point, evaluates each
///    test in order and prints one protocol line per test
///
/// User code goes first so crate-level inner attributes keep working.
/// Item order does not matter to rustc otherwise.
use crucible_common::protocol::{
    flatten_description, result_prefix, HARNESS_FAILURE_EXIT_CODE, INTERNAL_MAIN,
    USER_CODE_SYMBOL,
};
use crucible_common::types::TestSpec;
use regex::bytes::Regex;
use std::fmt::Write;
use std::sync::OnceLock;

/// rustc rejects raw strings delimited by more hashes than this
const MAX_RAW_HASHES: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Harness {
    pub source: String,
    /// A user `main` was renamed and is called from the generated one
    pub calls_user_main: bool,
}

fn user_main_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\bfn\s+main\s*\(").expect("entry point pattern is valid"))
}

/// Build the harness source for a request
pub fn synthesize(code: &str, tests: &[TestSpec]) -> Harness {
    // The literal is taken from the original text, before any rename
    let literal = embed_literal(code);

    let (compiled_code, calls_user_main) = if tests.is_empty() {
        (code.to_string(), false)
    } else {
        rename_user_main(code)
    };

    let mut source = String::with_capacity(compiled_code.len() * 2 + tests.len() * 256);
    source.push_str(&compiled_code);
    if !compiled_code.ends_with('\n') {
        source.push('\n');
    }
    let _ = writeln!(source);
    let _ = writeln!(source, "#[allow(dead_code)]");
    let _ = writeln!(source, "const {}: &str = {};", USER_CODE_SYMBOL, literal);

    if !tests.is_empty() {
        let _ = writeln!(source);
        source.push_str(&entry_point(tests, calls_user_main));
    }

    Harness {
        source,
        calls_user_main,
    }
}

/// Rename the first `fn main(` definition to the internal name.
/// Mentions inside comments and string or char literals are not definitions.
pub fn rename_user_main(code: &str) -> (String, bool) {
    let masked = mask_comments_and_literals(code);
    let Some(found) = user_main_pattern().find(&masked) else {
        return (code.to_string(), false);
    };
    let renamed = format!(
        "{}fn {}({}",
        &code[..found.start()],
        INTERNAL_MAIN,
        &code[found.end()..]
    );
    (renamed, true)
}

/// Copy of `code` with comment and literal bodies blanked to spaces.
/// Byte offsets are unchanged and every blanked range starts and ends on an
/// ASCII delimiter, so offsets found here slice `code` safely.
fn mask_comments_and_literals(code: &str) -> Vec<u8> {
    let src = code.as_bytes();
    let mut out = src.to_vec();
    let mut i = 0;

    while i < src.len() {
        let rest = &src[i..];
        let end = if rest.starts_with(b"//") {
            i + rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len())
        } else if rest.starts_with(b"/*") {
            block_comment_end(src, i)
        } else if let Some(end) = raw_string_end(src, i) {
            end
        } else if src[i] == b'"' {
            quoted_end(src, i, b'"')
        } else if src[i] == b'\'' && is_char_literal(src, i) {
            quoted_end(src, i, b'\'')
        } else {
            i += 1;
            continue;
        };

        for b in &mut out[i..end] {
            if *b != b'\n' {
                *b = b' ';
            }
        }
        i = end;
    }

    out
}

/// Block comments nest in Rust
fn block_comment_end(src: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < src.len() {
        if src[i..].starts_with(b"/*") {
            depth += 1;
            i += 2;
        } else if src[i..].starts_with(b"*/") {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return i;
            }
        } else {
            i += 1;
        }
    }
    src.len()
}

/// End of a raw string starting with the `r` at `i`, if one starts there
fn raw_string_end(src: &[u8], i: usize) -> Option<usize> {
    if src[i] != b'r' || !starts_token(src, i) {
        return None;
    }
    let hashes = src[i + 1..].iter().take_while(|&&b| b == b'#').count();
    let open = i + 1 + hashes;
    // `r#ident` is a raw identifier, not a string
    if src.get(open) != Some(&b'"') {
        return None;
    }
    let mut j = open + 1;
    while j < src.len() {
        if src[j] == b'"' && src[j + 1..].iter().take_while(|&&b| b == b'#').count() >= hashes {
            return Some(j + 1 + hashes);
        }
        j += 1;
    }
    Some(src.len())
}

/// `r` at `i` is not the tail of an identifier (`br"` still counts)
fn starts_token(src: &[u8], i: usize) -> bool {
    let is_ident = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    match i.checked_sub(1).map(|p| src[p]) {
        None => true,
        Some(b'b') => i < 2 || !is_ident(src[i - 2]),
        Some(b) => !is_ident(b),
    }
}

/// End of a `"..."` or `'...'` literal opened at `start`, escapes honoured
fn quoted_end(src: &[u8], start: usize, quote: u8) -> usize {
    let mut j = start + 1;
    while j < src.len() {
        match src[j] {
            b'\\' => j += 2,
            b if b == quote => return j + 1,
            _ => j += 1,
        }
    }
    src.len()
}

/// Tell `'x'` and `'\n'` apart from lifetimes such as `'a`
fn is_char_literal(src: &[u8], i: usize) -> bool {
    let Some(&first) = src.get(i + 1) else {
        return false;
    };
    if first == b'\\' {
        return true;
    }
    let width = match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    };
    src.get(i + 1 + width) == Some(&b'\'')
}

/// Encode arbitrary text as a Rust string literal that evaluates to exactly `text`.
///
/// Prefers a raw string whose `#` fence is longer than any `"#...` run in
/// the text, so the closing delimiter cannot appear inside the content.
/// Falls back to an escaped literal when raw strings cannot represent the
/// text byte-for-byte (carriage returns) or the fence would be too long.
pub fn embed_literal(text: &str) -> String {
    let hashes = raw_fence_len(text);
    if text.contains('\r') || hashes > MAX_RAW_HASHES {
        return escaped_literal(text);
    }
    let fence = "#".repeat(hashes);
    format!("r{fence}\"{text}\"{fence}")
}

/// Ordinary string literal; `{:?}` on `str` only produces escapes rustc accepts
fn escaped_literal(text: &str) -> String {
    format!("{:?}", text)
}

fn raw_fence_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let longest = bytes
        .iter()
        .enumerate()
        .filter(|&(_, &b)| b == b'"')
        .map(|(i, _)| bytes[i + 1..].iter().take_while(|&&b| b == b'#').count())
        .max()
        .unwrap_or(0);
    longest + 1
}

fn entry_point(tests: &[TestSpec], calls_user_main: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "fn main() {{");
    if calls_user_main {
        let _ = writeln!(out, "    {}();", INTERNAL_MAIN);
    }
    let _ = writeln!(out, "    let mut all_passed = true;");

    for (idx, spec) in tests.iter().enumerate() {
        let desc = escaped_literal(&flatten_description(&spec.description));
        let _ = writeln!(out);
        let _ = writeln!(out, "    // Test {}", idx + 1);
        let _ = writeln!(out, "    {{");
        let _ = writeln!(out, "        let result: bool = {{");
        let _ = writeln!(out, "{}", spec.test);
        let _ = writeln!(out, "        }};");
        let _ = writeln!(out, "        if result {{");
        let _ = writeln!(out, "            println!(\"{}{{}}\", {});", result_prefix(true), desc);
        let _ = writeln!(out, "        }} else {{");
        let _ = writeln!(out, "            println!(\"{}{{}}\", {});", result_prefix(false), desc);
        let _ = writeln!(out, "            all_passed = false;");
        let _ = writeln!(out, "        }}");
        let _ = writeln!(out, "    }}");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "    if !all_passed {{");
    let _ = writeln!(out, "        std::process::exit({});", HARNESS_FAILURE_EXIT_CODE);
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "}}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(description: &str, test: &str) -> TestSpec {
        TestSpec::new(description, test)
    }

    #[test]
    fn test_no_tests_is_pass_through() {
        let code = "fn main() {\n    println!(\"hi\");\n}\n";
        let harness = synthesize(code, &[]);

        assert!(!harness.calls_user_main);
        assert!(harness.source.starts_with(code));
        assert!(harness.source.contains("const USER_CODE: &str = r#\""));
        assert!(!harness.source.contains(INTERNAL_MAIN));
        assert_eq!(harness.source.matches("fn main(").count(), 2); // code + literal copy
    }

    #[test]
    fn test_user_main_renamed_but_literal_preserved() {
        let code = "fn main() { println!(\"side effect\"); }";
        let harness = synthesize(code, &[spec("runs", "true")]);

        assert!(harness.calls_user_main);
        assert!(harness.source.starts_with("fn _internal_main() {"));
        // The embedded literal keeps the original text
        assert!(harness
            .source
            .contains("r#\"fn main() { println!(\"side effect\"); }\"#"));
        assert!(harness.source.contains("    _internal_main();\n"));
    }

    #[test]
    fn test_rename_only_first_definition() {
        let (renamed, found) = rename_user_main("pub fn main  () {}\nfn main(){}");
        assert!(found);
        assert_eq!(renamed, "pub fn _internal_main() {}\nfn main(){}");
    }

    #[test]
    fn test_rename_ignores_similar_names() {
        let (renamed, found) = rename_user_main("fn main_loop() {}\nfn domain() {}");
        assert!(!found);
        assert_eq!(renamed, "fn main_loop() {}\nfn domain() {}");
    }

    #[test]
    fn test_rename_skips_commented_main() {
        let code = "// fn main() is below\nfn main() { println!(\"hi\"); }\nfn one() -> i32 { 1 }";
        let (renamed, found) = rename_user_main(code);
        assert!(found);
        assert_eq!(
            renamed,
            "// fn main() is below\nfn _internal_main() { println!(\"hi\"); }\nfn one() -> i32 { 1 }"
        );
    }

    #[test]
    fn test_rename_skips_block_comments_and_literals() {
        let code = concat!(
            "/* outer /* fn main() nested */ fn main() */\n",
            "const A: &str = \"fn main() {\";\n",
            "const B: &str = r#\"fn main(\" \"#;\n",
            "const Q: char = '\"';\n",
            "fn pick<'a>(s: &'a str) -> &'a str { s }\n",
            "fn main() {}\n",
        );
        let (renamed, found) = rename_user_main(code);
        assert!(found);
        assert_eq!(renamed.matches("fn main(").count(), 4);
        assert!(renamed.ends_with("fn _internal_main() {}\n"));
    }

    #[test]
    fn test_rename_keeps_non_ascii_text() {
        let (renamed, found) = rename_user_main("// héllo fn main()\nfn   main () { let _ = 'é'; }");
        assert!(found);
        assert_eq!(renamed, "// héllo fn main()\nfn _internal_main() { let _ = 'é'; }");
    }

    #[test]
    fn test_raw_identifier_is_not_a_string() {
        let (renamed, found) = rename_user_main("fn r#type() {}\nfn main() {}");
        assert!(found);
        assert_eq!(renamed, "fn r#type() {}\nfn _internal_main() {}");
    }

    #[test]
    fn test_no_user_main_no_forward_call() {
        let harness = synthesize("fn add(a: i32, b: i32) -> i32 { a + b }", &[spec("adds", "add(1, 1) == 2")]);
        assert!(!harness.calls_user_main);
        assert!(!harness.source.contains("_internal_main();"));
        assert!(harness.source.contains("add(1, 1) == 2"));
    }

    #[test]
    fn test_tests_emitted_in_order_as_blocks() {
        let tests = vec![
            spec("first", "1 == 1"),
            spec("second", "let v = vec![1, 2];\nv.len() == 2"),
        ];
        let harness = synthesize("fn helper() {}", &tests);
        let src = &harness.source;

        let first = src.find("\"first\"").unwrap();
        let second = src.find("\"second\"").unwrap();
        assert!(first < second);
        assert!(src.contains("let result: bool = {\nlet v = vec![1, 2];\nv.len() == 2\n        };"));
        assert!(src.contains("println!(\"TEST_PASS|{}\", \"first\");"));
        assert!(src.contains("println!(\"TEST_FAIL|{}\", \"first\");"));
        assert!(src.contains("std::process::exit(3);"));
    }

    #[test]
    fn test_description_escaping() {
        let tests = vec![spec("say \"hi\" \\ {} done\nnext", "true")];
        let harness = synthesize("fn f() {}", &tests);
        assert!(harness
            .source
            .contains(r#"println!("TEST_PASS|{}", "say \"hi\" \\ {} done next");"#));
    }

    #[test]
    fn test_fence_grows_past_content() {
        assert_eq!(embed_literal("plain"), "r#\"plain\"#");
        assert_eq!(embed_literal("say \"hi\""), "r#\"say \"hi\"\"#");
        assert_eq!(embed_literal("x = \"#\";"), "r##\"x = \"#\";\"##");
        assert_eq!(
            embed_literal("r####\"evil\"####"),
            "r#####\"r####\"evil\"####\"#####"
        );
    }

    #[test]
    fn test_hashes_without_quote_do_not_grow_fence() {
        assert_eq!(embed_literal("#[derive(Debug)] ####"), "r#\"#[derive(Debug)] ####\"#");
    }

    #[test]
    fn test_carriage_return_uses_escaped_literal() {
        assert_eq!(embed_literal("a\r\nb\"c"), "\"a\\r\\nb\\\"c\"");
    }

    #[test]
    fn test_oversized_fence_uses_escaped_literal() {
        let text = format!("\"{}", "#".repeat(300));
        let literal = embed_literal(&text);
        assert!(literal.starts_with('"'));
        assert!(!literal.starts_with('r'));
    }

    #[test]
    fn test_inner_attributes_stay_first() {
        let code = "#![allow(unused)]\nfn main() {}";
        let harness = synthesize(code, &[spec("ok", "true")]);
        assert!(harness.source.starts_with("#![allow(unused)]\nfn _internal_main() {}"));
    }
}
