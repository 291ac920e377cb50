use super::CommandRegistry;
use super::CommandResult;

fn response_line(rendered: &str) -> &str {
    rendered.lines().next().unwrap()
}

#[test]
fn test_success_and_failure_prefixes() {
    let registry = CommandRegistry::new();
    registry.register("echo", |args: &[&str]| -> CommandResult { Ok(args.join(",")) });
    registry.register("fail", |_: &[&str]| -> CommandResult { Err("boom".to_string()) });

    let ok = registry.execute("echo a b").unwrap();
    assert_eq!(response_line(&ok), "+ a,b");

    let err = registry.execute("fail").unwrap();
    assert_eq!(response_line(&err), "- boom");
}

#[test]
fn test_unknown_command() {
    let registry = CommandRegistry::new();
    let rendered = registry.execute("nope 1 2").unwrap();
    assert_eq!(response_line(&rendered), "- unknown command: nope");
}

#[test]
fn test_elapsed_line_follows_response() {
    let registry = CommandRegistry::new();
    registry.register("ping", |_: &[&str]| -> CommandResult { Ok("pong".into()) });

    let rendered = registry.execute("ping").unwrap();
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("elapsed "));
    assert!(lines[1].ends_with(" sec"));
    let seconds: f64 = lines[1]["elapsed ".len()..lines[1].len() - " sec".len()].parse().unwrap();
    assert!(seconds >= 0.0);
}

#[test]
fn test_blank_line_is_ignored() {
    let registry = CommandRegistry::new();
    assert_eq!(registry.execute(""), None);
    assert_eq!(registry.execute("   \t "), None);
}

#[test]
fn test_extra_whitespace_between_words() {
    let registry = CommandRegistry::new();
    registry.register("count", |args: &[&str]| -> CommandResult { Ok(args.len().to_string()) });
    assert_eq!(response_line(&registry.execute("  count   a    b  ").unwrap()), "+ 2");
}

#[test]
fn test_register_replaces_and_unregister_removes() {
    let registry = CommandRegistry::new();
    registry.register("v", |_: &[&str]| -> CommandResult { Ok("1".into()) });
    registry.register("v", |_: &[&str]| -> CommandResult { Ok("2".into()) });
    assert_eq!(response_line(&registry.execute("v").unwrap()), "+ 2");

    assert!(registry.unregister("v"));
    assert!(!registry.unregister("v"));
    assert!(!registry.contains("v"));
    assert_eq!(response_line(&registry.execute("v").unwrap()), "- unknown command: v");
}
