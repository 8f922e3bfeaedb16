//! Command injection challenge (`cmdi_001`)
//!
//! Safe: `subprocess` called with an argument list and no shell.
//! Unsafe: any direct shell execution (`os.system`, `os.popen`,
//! `shell=True`, `getoutput`).
//!
//! A subprocess call only counts as safe when its own arguments carry no
//! shell flag.

use super::{PatternSet, Verdict};

/// Each pattern ends at the call's opening parenthesis
const SAFE_PATTERNS: &[&str] = &[r"\bsubprocess\.(?:run|call|check_call|check_output|Popen)\("];

const SHELL_FLAG: &[&str] = &[r"\bshell\s*=\s*True\b"];

const UNSAFE_PATTERNS: &[&str] = &[
    r"\bos\.system\(",
    r"\bos\.popen\(",
    r"\bshell\s*=\s*True\b",
    r"\bsubprocess\.getoutput\(",
    r"\bsubprocess\.getstatusoutput\(",
    r"\bcommands\.getoutput\(",
];

pub struct CommandInjectionRule {
    safe: PatternSet,
    shell_flag: PatternSet,
    risky: PatternSet,
}

impl CommandInjectionRule {
    pub fn new() -> Self {
        Self {
            safe: PatternSet::new(SAFE_PATTERNS),
            shell_flag: PatternSet::new(SHELL_FLAG),
            risky: PatternSet::new(UNSAFE_PATTERNS),
        }
    }

    pub fn evaluate(&self, code: &str) -> Verdict {
        Verdict::from_signals(
            self.has_shell_free_call(code),
            self.risky.is_match(code),
            "Command runs through subprocess with an argument list and no shell.",
            "subprocess is used, but shell execution is still enabled somewhere.",
            "Direct shell execution detected. Pass an argument list to subprocess without \
             shell=True.",
            "No safe subprocess invocation detected. Run the command through subprocess with \
             an argument list.",
        )
    }

    fn has_shell_free_call(&self, code: &str) -> bool {
        self.safe
            .match_ends(code)
            .any(|start| !self.shell_flag.is_match(call_arguments(code, start)))
    }
}

/// Argument text of a call whose opening parenthesis ends just before `start`.
///
/// Brackets inside string literals are ignored. An unclosed call runs to the
/// end of the snippet.
fn call_arguments(code: &str, start: usize) -> &str {
    let rest = &code[start..];
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in rest.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return &rest[..i];
                }
            }
            _ => {}
        }
    }
    rest
}

impl Default for CommandInjectionRule {
    fn default() -> Self {
        Self::new()
    }
}
