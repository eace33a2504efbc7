use std::io::Write;

use pretty_assertions::assert_eq;
use rbscope_core::config::RuntimeProfile;
use rbscope_core::error::RbscopeError;
use rstest::rstest;
use tempfile::NamedTempFile;

#[test]
fn test_partial_profile_keeps_defaults()
{
    let profile = RuntimeProfile::from_toml_str(
        r#"
        [types]
        thread = "rb_execution_context_t"

        [walk]
        max_frames = 512
        "#,
    )
    .unwrap();

    assert_eq!(profile.types.thread, "rb_execution_context_t");
    assert_eq!(profile.types.control_frame, "rb_control_frame_t");
    assert_eq!(profile.walk.max_frames, 512);
    assert_eq!(profile.walk.sentinel_frames, 2);
    assert_eq!(profile.fields, RuntimeProfile::default().fields);
}

#[test]
fn test_string_encoding_override()
{
    let profile = RuntimeProfile::from_toml_str(
        r#"
        [string]
        noembed_bit = 13
        embed_len_shift = 14
        embed_len_mask = 31
        "#,
    )
    .unwrap();

    assert_eq!(profile.string.embedded_len(5 << 14), Some(5));
}

#[test]
fn test_unknown_key_is_rejected()
{
    let err = RuntimeProfile::from_toml_str("[walk]\nmax_frame = 10\n").unwrap_err();
    assert!(matches!(err, RbscopeError::Config(message) if message.contains("max_frame")));
}

#[test]
fn test_load_from_file()
{
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[symbols]\ncurrent_thread = \"ruby_current_execution_context_ptr\"").unwrap();

    let profile = RuntimeProfile::load_from_file(file.path()).unwrap();
    assert_eq!(profile.symbols.current_thread, "ruby_current_execution_context_ptr");
}

#[test]
fn test_load_error_names_the_file()
{
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[walk]\nmax_frames = \"lots\"").unwrap();

    let err = RuntimeProfile::load_from_file(file.path()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains(&file.path().display().to_string()), "{message}");
}

#[test]
fn test_missing_file_is_config_error()
{
    let dir = tempfile::tempdir().unwrap();
    let err = RuntimeProfile::load_from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, RbscopeError::Config(_)));
}

#[test]
fn test_explicit_path_wins_in_resolve()
{
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[walk]\nmax_string_len = 128").unwrap();

    let profile = RuntimeProfile::resolve(Some(file.path())).unwrap();
    assert_eq!(profile.walk.max_string_len, 128);
}

#[test]
fn test_printed_profile_parses_back()
{
    let mut profile = RuntimeProfile::default();
    profile.fields.body_path = "location.pathobj".into();
    profile.walk.max_frames = 4096;

    let text = profile.to_toml_string().unwrap();
    assert_eq!(RuntimeProfile::from_toml_str(&text).unwrap(), profile);
}

#[rstest]
#[case("[string]\nnoembed_bit = 64\n", "noembed_bit")]
#[case("[string]\nnoembed_bit = 200\n", "noembed_bit")]
#[case("[string]\nembed_len_shift = 70\nembed_len_mask = 31\n", "embed_len_shift")]
fn test_string_bits_outside_flags_word_are_rejected(#[case] content: &str, #[case] key: &str)
{
    let err = RuntimeProfile::from_toml_str(content).unwrap_err();
    assert!(matches!(&err, RbscopeError::Config(message) if message.contains(key)), "{err}");
}

#[test]
fn test_highest_flag_bit_is_accepted()
{
    let profile = RuntimeProfile::from_toml_str("[string]\nnoembed_bit = 63\nembed_len_shift = 63\n").unwrap();
    assert_eq!(profile.string.noembed_mask(), 1 << 63);
}

#[test]
fn test_out_of_range_bit_in_file_names_the_file()
{
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[string]\nnoembed_bit = 64").unwrap();

    let err = RuntimeProfile::load_from_file(file.path()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains(&file.path().display().to_string()), "{message}");
    assert!(message.contains("noembed_bit"), "{message}");
}
