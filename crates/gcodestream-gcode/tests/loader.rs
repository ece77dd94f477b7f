use gcodestream_core::LoadError;
use gcodestream_gcode::{GcodeLoader, TrajectoryHint};
use proptest::prelude::*;
use std::io::Write;

#[test]
fn test_load_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "; header").unwrap();
    writeln!(file, "G21").unwrap();
    writeln!(file, "G0 X12.5 Y-3").unwrap();
    writeln!(file, "   ").unwrap();
    writeln!(file, "(end)").unwrap();

    let program = GcodeLoader::load_file(file.path()).unwrap();
    assert_eq!(program.commands(), &["G21", "G0 X12.5 Y-3"]);
    assert_eq!(
        program.trajectory(),
        TrajectoryHint {
            last_x: 12.5,
            last_y: -3.0
        }
    );
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = GcodeLoader::load_file(dir.path().join("missing.nc"));
    assert!(matches!(result, Err(LoadError::FileError { .. })));
}

#[test]
fn test_load_invalid_utf8_is_io_error() {
    let bytes: &[u8] = b"G0 X1\n\xff\xfe\n";
    let result = GcodeLoader::load(bytes);
    assert!(matches!(result, Err(LoadError::Io(_))));
}

#[test]
fn test_empty_input_gives_empty_program() {
    let program = GcodeLoader::load_str("\n\n; only comments\n(and notes)\n");
    assert!(program.is_empty());
    assert_eq!(program.trajectory(), TrajectoryHint::default());
}

proptest! {
    #[test]
    fn loaded_commands_are_trimmed_and_not_comments(text in "[ -~\n\t]{0,400}") {
        let program = GcodeLoader::load_str(&text);
        for command in program.commands() {
            prop_assert!(!command.is_empty());
            prop_assert_eq!(command.trim(), command.as_str());
            prop_assert!(!command.starts_with(';'));
            prop_assert!(!command.starts_with('('));
        }
    }

    #[test]
    fn reader_and_str_loading_agree(text in "[ -~\n]{0,200}") {
        let from_str = GcodeLoader::load_str(&text);
        let from_reader = GcodeLoader::load(text.as_bytes()).unwrap();
        prop_assert_eq!(from_str.commands(), from_reader.commands());
        prop_assert_eq!(
            from_str.trajectory().last_x.to_bits(),
            from_reader.trajectory().last_x.to_bits()
        );
    }
}
