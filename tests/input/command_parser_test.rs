use debugcat::ui::console::{parse_command, Command};
use proptest::prelude::*;
use test_case::test_case;

#[test]
fn test_basic_commands() {
    assert_eq!(parse_command("continue"), Command::Continue);
    assert_eq!(parse_command("c"), Command::Continue);
    assert_eq!(parse_command("step"), Command::Step);
    assert_eq!(parse_command("next"), Command::Next);
    assert_eq!(parse_command("stepi"), Command::StepInstruction);
    assert_eq!(parse_command("halt"), Command::Halt);
    assert_eq!(parse_command("quit"), Command::Quit);
    assert_eq!(parse_command("help"), Command::Help);
}

#[test_case("break main.go:10", Command::Break("main.go".to_string(), 10) ; "break at line")]
#[test_case("trace /p/f.go:10", Command::Trace("/p/f.go".to_string(), 10) ; "tracepoint")]
#[test_case("cond f.go:3", Command::Cond("f.go".to_string(), 3, String::new()) ; "drop condition")]
#[test_case("print cfg.Servers[0]", Command::Print("cfg.Servers[0]".to_string()) ; "evaluate expression")]
#[test_case("show  p ", Command::Show("p".to_string()) ; "show trims")]
#[test_case("set s \"a b\"", Command::Set("s".to_string(), "\"a b\"".to_string()) ; "set keeps spaces in value")]
#[test_case("task 17", Command::Task(17) ; "switch task")]
#[test_case("thread 3", Command::Thread(3) ; "switch thread")]
#[test_case("funcs ^main\\.", Command::Funcs("^main\\.".to_string()) ; "funcs filter")]
fn test_parameterized_commands(line: &str, expected: Command) {
    assert_eq!(parse_command(line), expected);
}

#[test]
fn test_malformed_commands() {
    for line in ["", "   ", "clear", "clear nowhere", "task x", "find foo.go", "set x"] {
        assert!(matches!(parse_command(line), Command::Unknown(_)), "{:?} should not parse", line);
    }
}

proptest! {
    #[test]
    fn test_parse_never_panics(line in "\\PC{0,64}") {
        let _ = parse_command(&line);
    }

    #[test]
    fn test_break_locations_round_trip(path in "/[a-z]{1,8}(/[a-z]{1,8}){0,3}\\.go", line in 1u32..100_000) {
        let cmd = parse_command(&format!("b {}:{}", path, line));
        prop_assert_eq!(cmd, Command::Break(path, line));
    }
}
