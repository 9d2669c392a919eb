use super::*;

fn run(input: &str) -> ChatCommand {
    match process_input(input) {
        CommandResult::Run(command) => command,
        other => panic!("expected a command for {input:?}, got {other:?}"),
    }
}

#[test]
fn plain_text_and_unknown_commands_are_messages() {
    assert_eq!(
        process_input("hello there"),
        CommandResult::ProcessAsMessage("hello there".into())
    );
    assert_eq!(
        process_input("/shrug ok"),
        CommandResult::ProcessAsMessage("/shrug ok".into())
    );
    assert_eq!(process_input("/"), CommandResult::ProcessAsMessage("/".into()));
}

#[test]
fn regeneration_commands_carry_modification() {
    assert_eq!(
        run("/regen"),
        ChatCommand::Regenerate {
            number: None,
            modification: None
        }
    );
    assert_eq!(
        run("/shorter 4"),
        ChatCommand::Regenerate {
            number: Some(4),
            modification: Some(Modification::Shorter)
        }
    );
    assert_eq!(
        run("/LONGER"),
        ChatCommand::Regenerate {
            number: None,
            modification: Some(Modification::Longer)
        }
    );
    assert!(matches!(process_input("/regen zero"), CommandResult::Usage(_)));
    assert!(matches!(process_input("/regen 0"), CommandResult::Usage(_)));
}

#[test]
fn edit_needs_number_and_text() {
    assert_eq!(
        run("/edit 3 what about dogs?"),
        ChatCommand::Edit {
            number: 3,
            text: "what about dogs?".into()
        }
    );
    assert!(matches!(process_input("/edit 3"), CommandResult::Usage(_)));
    assert!(matches!(process_input("/edit cats"), CommandResult::Usage(_)));
}

#[test]
fn backend_accepts_legacy_names_and_toggle() {
    assert_eq!(run("/backend"), ChatCommand::Backend(None));
    assert_eq!(
        run("/model deepseek"),
        ChatCommand::Backend(Some(BackendId::Alternate))
    );
    assert!(matches!(process_input("/backend gpt"), CommandResult::Usage(_)));
}

#[test]
fn profile_name_may_contain_spaces() {
    assert_eq!(
        run("/profile Anna Maria female"),
        ChatCommand::Profile {
            name: "Anna Maria".into(),
            gender: Gender::Female
        }
    );
    assert!(matches!(process_input("/profile Anna"), CommandResult::Usage(_)));
}

#[test]
fn attachments_and_voice_take_paths() {
    assert_eq!(
        run("/attach a.png b.jpg"),
        ChatCommand::Attach(vec![PathBuf::from("a.png"), PathBuf::from("b.jpg")])
    );
    assert_eq!(run("/detach"), ChatCommand::Detach(None));
    assert_eq!(run("/voice"), ChatCommand::Voice(AudioFiles::default()));
    assert_eq!(
        run("/voice in.wav out.wav"),
        ChatCommand::Voice(AudioFiles {
            input: Some("in.wav".into()),
            output: Some("out.wav".into())
        })
    );
    assert!(matches!(process_input("/voice in.wav"), CommandResult::Usage(_)));
}

#[test]
fn simple_commands_parse() {
    assert_eq!(run("/nsfw on"), ChatCommand::ContentPolicy { unfiltered: true });
    assert_eq!(run("/search  cat "), ChatCommand::Search("cat".into()));
    assert_eq!(run("/gallery"), ChatCommand::Gallery);
    assert_eq!(run("/exit"), ChatCommand::Quit);
    assert!(help_text().contains("/shorter [n]"));
}
