//! End-to-end startup scenarios over a real data directory.
//!
//! Exercises the facade the host plugin uses: build a coordinator over a
//! temp directory seeded with legacy-generation files, run `initialize`,
//! and check what landed on disk.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::TempDir;

use claudian_store::{
    CommandDefinition, CommandStore, LocalAdapter, MigrationCoordinator, PluginSettingsPatch,
    Session, SessionStore, StoredMessage,
};

fn read_json(root: &Path, name: &str) -> Value {
    serde_json::from_str(&std::fs::read_to_string(root.join(name)).unwrap()).unwrap()
}

/// Every file under `root` with its contents, sorted by relative path.
fn snapshot_files(root: &Path) -> Vec<(String, String)> {
    fn walk(dir: &Path, root: &Path, acc: &mut Vec<(String, String)>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, root, acc);
            } else {
                let name = path
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .into_owned();
                acc.push((name, std::fs::read_to_string(&path).unwrap()));
            }
        }
    }
    let mut acc = Vec::new();
    walk(root, root, &mut acc);
    acc.sort();
    acc
}

#[tokio::test]
async fn full_legacy_startup_migrates_everything() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    // A first-generation install: one combined settings file, everything
    // else inline in the host's state object.
    std::fs::write(
        root.join("settings.json"),
        json!({
            "userName": "ann",
            "model": "opus",
            "blockedCommands": ["rm -rf /tmp/scratch", "  "],
            "environmentVariables": "EDITOR=vim",
            "env": {"CLAUDE_CODE_MAX_OUTPUT_TOKENS": "32000"},
            "permissions": [
                {"toolName": "Bash", "pattern": "git status", "scope": "always"},
                {"toolName": "WebSearch", "pattern": "*", "scope": "always"}
            ],
            "activeSessionId": "conv-7"
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(
        root.join("data.json"),
        json!({
            "lastClaudeModel": "opus",
            "commands": [
                {"id": "cmd-1", "name": "Daily Summary", "content": "Summarize my day"}
            ],
            "conversations": [
                {"id": "conv-7", "title": "trip planning", "createdAt": 1000, "updatedAt": 4000,
                 "messages": [
                     {"role": "user", "content": "plan a trip", "timestamp": 2000},
                     {"role": "assistant", "content": "where to?", "timestamp": 3000}
                 ]}
            ],
            "workspaceLayout": {"sidebar": "open"}
        })
        .to_string(),
    )
    .unwrap();

    let coordinator = MigrationCoordinator::open(root);
    let settings = coordinator.initialize().await.unwrap();

    // Plugin settings carry the migrated values
    assert_eq!(settings.plugin.user_name, "ann");
    assert_eq!(settings.plugin.model, "opus");
    // flat legacy blocklist lands in the unix bucket, windows defaulted
    assert_eq!(
        settings.plugin.blocked_commands.unix,
        vec!["rm -rf /tmp/scratch"]
    );
    assert!(!settings.plugin.blocked_commands.windows.is_empty());
    assert_eq!(
        settings.plugin.environment_variables,
        "EDITOR=vim\nCLAUDE_CODE_MAX_OUTPUT_TOKENS=32000"
    );
    assert_eq!(settings.plugin.last_claude_model.as_deref(), Some("opus"));

    // The CLI file shrank to schema plus converted permissions
    let agent = read_json(root, "settings.json");
    assert_eq!(agent.as_object().unwrap().len(), 2);
    assert_eq!(
        agent["permissions"]["allow"],
        json!(["Bash(git status)", "WebSearch"])
    );

    // Entities became real files
    let command = coordinator
        .commands()
        .load("Daily Summary")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(command.content, "Summarize my day");
    assert!(root.join("commands/daily-summary.md").is_file());

    let session = coordinator.sessions().load("conv-7").await.unwrap().unwrap();
    assert_eq!(session.header.title, "trip planning");
    assert_eq!(session.messages.len(), 2);

    // The blob kept only what the plugin never owned
    assert_eq!(
        read_json(root, "data.json"),
        json!({"workspaceLayout": {"sidebar": "open"}})
    );

    // A second startup changes nothing, byte for byte
    let before = snapshot_files(root);
    let settings_again = coordinator.initialize().await.unwrap();
    assert_eq!(settings_again.plugin, settings.plugin);
    assert_eq!(snapshot_files(root), before);
}

#[tokio::test]
async fn one_corrupt_entity_never_hides_the_rest() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let files = Arc::new(LocalAdapter::new(root));

    let commands = CommandStore::new(files.clone());
    commands
        .save(&CommandDefinition::new("Alpha", "a"))
        .await
        .unwrap();
    commands
        .save(&CommandDefinition::new("Beta", "b"))
        .await
        .unwrap();
    std::fs::write(root.join("commands/broken.md"), "no frontmatter here").unwrap();

    let sessions = SessionStore::new(files);
    let mut keep = Session::new("kept");
    keep.header.id = "keep-1".to_string();
    sessions.save(&keep).await.unwrap();
    std::fs::write(root.join("sessions/broken.jsonl"), "][ not json\n").unwrap();

    assert_eq!(commands.load_all().await.unwrap().len(), 2);
    assert_eq!(sessions.load_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn fresh_install_survives_restart() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    let coordinator = MigrationCoordinator::open(root);
    let first = coordinator.initialize().await.unwrap();
    assert_eq!(first.plugin.model, "sonnet");

    // One settings change, one command, one conversation with a streamed
    // message, exactly what a first real session produces.
    let patch = PluginSettingsPatch {
        model: Some("opus".to_string()),
        ..PluginSettingsPatch::default()
    };
    coordinator.plugin_settings().update(&patch).await.unwrap();

    coordinator
        .commands()
        .save(&CommandDefinition::new("Fix Grammar", "Fix: $ARGUMENTS"))
        .await
        .unwrap();

    let mut session = Session::new("first chat");
    session.header.id = "chat-1".to_string();
    coordinator.sessions().save(&session).await.unwrap();
    coordinator
        .sessions()
        .append_message("chat-1", &StoredMessage::new("user", "hello"))
        .await
        .unwrap();

    // Restart: a new coordinator over the same directory
    let restarted = MigrationCoordinator::open(root);
    let settings = restarted.initialize().await.unwrap();
    assert_eq!(settings.plugin.model, "opus");

    let loaded = restarted.sessions().load("chat-1").await.unwrap().unwrap();
    assert_eq!(loaded.messages.len(), 1);
    assert_eq!(restarted.commands().load_all().await.unwrap().len(), 1);
}
