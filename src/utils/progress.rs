//! Per-step progress lines with a trailing `[OK]`/`[KO]` marker

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

pub fn banner(title: &str) {
    println!("{}", RULE);
    println!("{}", title);
    println!("{}", RULE);
    println!();
}

pub fn marker(ok: bool) -> &'static str {
    if ok { "[OK]" } else { "[KO]" }
}

pub fn format_step(label: &str, ok: bool) -> String {
    format!("{}: {}", label, marker(ok))
}

pub fn step(label: &str, ok: bool) {
    println!("{}", format_step(label, ok));
}

/// Print the step line for a result and hand the result back
pub fn report<T, E>(label: &str, result: Result<T, E>) -> Result<T, E> {
    step(label, result.is_ok());
    result
}
