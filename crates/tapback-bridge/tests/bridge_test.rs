//! End-to-end reads and sends against a fixture Messages store.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rusqlite::{Connection, params};
use tapback_bridge::{Bridge, BridgeConfig, BridgeError, NameResolver, ScriptRunner};
use tapback_db::schema::create_fixture_schema;
use tapback_types::MessageKind;

const ALICE: &str = "+15551234567";
const BOB: &str = "+15557654321";
const CAROL: &str = "carol@example.com";
const ALICE_EMAIL: &str = "alice@example.com";
const GROUP_ID: &str = "chat;+;+15551234567,+15557654321";

/// Resolver that knows Alice, under both of her handles, and records
/// every build call.
#[derive(Default)]
struct RecordingResolver {
    builds: Vec<HashSet<String>>,
    names: HashMap<String, String>,
}

impl NameResolver for RecordingResolver {
    fn build_index_for_handles(&mut self, handles: &HashSet<String>) {
        self.builds.push(handles.clone());
        self.names.insert(ALICE.to_string(), "Alice Smith".to_string());
        self.names.insert(ALICE_EMAIL.to_string(), "Alice Smith".to_string());
    }

    fn get_contact_name(&self, handle: &str) -> Option<String> {
        self.names.get(handle).cloned()
    }
}

#[derive(Clone, Default)]
struct RecordingRunner {
    scripts: Rc<RefCell<Vec<String>>>,
}

impl ScriptRunner for RecordingRunner {
    fn run(&self, script: &str) -> tapback_bridge::Result<()> {
        self.scripts.borrow_mut().push(script.to_string());
        Ok(())
    }
}

struct MessageSpec<'a> {
    chat: i64,
    handle: i64,
    date: i64,
    from_me: bool,
    text: Option<&'a str>,
    attachment: bool,
    associated_type: i64,
}

fn insert(conn: &Connection, m: MessageSpec<'_>) {
    conn.execute(
        "INSERT INTO message (text, handle_id, date, is_from_me, cache_has_attachments, associated_message_type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![m.text, m.handle, m.date, m.from_me as i64, m.attachment as i64, m.associated_type],
    )
    .unwrap();
    let id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO chat_message_join (chat_id, message_id, message_date) VALUES (?1, ?2, ?3)",
        params![m.chat, id, m.date],
    )
    .unwrap();
}

/// Incoming row whose body lives only in `attributedBody`.
fn insert_blob(conn: &Connection, chat: i64, handle: i64, date: i64, blob: &[u8]) {
    conn.execute(
        "INSERT INTO message (text, attributedBody, handle_id, date, is_from_me, cache_has_attachments)
         VALUES (NULL, ?1, ?2, ?3, 0, 0)",
        params![blob, handle, date],
    )
    .unwrap();
    let id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO chat_message_join (chat_id, message_id, message_date) VALUES (?1, ?2, ?3)",
        params![chat, id, date],
    )
    .unwrap();
}

/// Typedstream archive of a single NSString.
fn typedstream(body: &str) -> Vec<u8> {
    let mut blob = b"\x04\x0bstreamtyped\x81\xe8\x03\x84\x01@".to_vec();
    blob.extend_from_slice(b"\x84\x84\x84\x08NSString\x01\x84\x84\x08NSObject\x00\x85");
    blob.extend_from_slice(b"\x84\x01+");
    match u8::try_from(body.len()) {
        Ok(len) if len < 0x80 => blob.push(len),
        _ => {
            blob.push(0x81);
            blob.extend_from_slice(&(body.len() as i16).to_le_bytes());
        }
    }
    blob.extend_from_slice(body.as_bytes());
    blob.push(0x86);
    blob
}

fn text(chat: i64, handle: i64, date: i64, from_me: bool, body: &str) -> MessageSpec<'_> {
    MessageSpec {
        chat,
        handle,
        date,
        from_me,
        text: Some(body),
        attachment: false,
        associated_type: 0,
    }
}

/// chat 1: Alice 1:1. chat 2: "Weekend" group whose latest row is a
/// tapback. chat 3: Carol, latest row a bare attachment. chat 4: unnamed
/// group whose latest row has nothing displayable. chat 5: group with no
/// identifier and no messages.
fn build_fixture(path: &Path) {
    let conn = Connection::open(path).unwrap();
    create_fixture_schema(&conn).unwrap();

    for handle in [ALICE, BOB, CAROL] {
        conn.execute("INSERT INTO handle (id) VALUES (?1)", [handle]).unwrap();
    }
    conn.execute_batch(&format!(
        "INSERT INTO chat (chat_identifier, display_name) VALUES ('{ALICE}', '');
         INSERT INTO chat (chat_identifier, display_name) VALUES ('{GROUP_ID}', 'Weekend');
         INSERT INTO chat (chat_identifier, display_name) VALUES ('{CAROL}', NULL);
         INSERT INTO chat (chat_identifier, display_name) VALUES ('chat;+;nobody', NULL);
         INSERT INTO chat (chat_identifier, display_name) VALUES (NULL, NULL);
         INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (1, 1);
         INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (2, 2);
         INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (2, 1);
         INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (3, 3);
         INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (4, 2);
         INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (4, 3);
         INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (5, 1);
         INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (5, 2);"
    ))
    .unwrap();

    insert(&conn, text(1, 1, 100, false, "hi"));
    insert(&conn, text(1, 1, 200, true, "hey  alice\n  how are you"));
    insert(&conn, text(2, 2, 150, false, "who's in"));
    insert(
        &conn,
        MessageSpec {
            associated_type: 2001,
            ..text(2, 1, 300, false, "Loved \u{201c}who's in\u{201d}")
        },
    );
    insert(
        &conn,
        MessageSpec {
            text: None,
            attachment: true,
            ..text(3, 3, 50, false, "")
        },
    );
    insert(&conn, text(4, 2, 20, false, "\u{FFFC}"));
}

struct Fixture {
    _dir: tempfile::TempDir,
    source: PathBuf,
    bridge: Bridge<RecordingResolver, RecordingRunner>,
    scripts: Rc<RefCell<Vec<String>>>,
}

fn open_fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("chat.db");
    build_fixture(&source);

    let config = BridgeConfig {
        source: source.clone(),
        snapshot: dir.path().join("snapshot/chat.db"),
    };
    let runner = RecordingRunner::default();
    let scripts = runner.scripts.clone();
    let bridge = Bridge::open(&config, RecordingResolver::default(), runner).unwrap();

    Fixture {
        _dir: dir,
        source,
        bridge,
        scripts,
    }
}

#[test]
fn recent_chats_summaries() {
    let mut fx = open_fixture();
    let chats = fx.bridge.recent_chats(50).unwrap();

    let ids: Vec<i64> = chats.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![2, 1, 3, 4]);

    let group = &chats[0];
    assert_eq!(group.name, "Weekend");
    assert_eq!(group.initials, "W");
    assert_eq!(group.preview, "Reaction");
    assert_eq!(group.chat_identifier.as_deref(), Some(GROUP_ID));
    assert_eq!(group.participants, vec![BOB.to_string(), ALICE.to_string()]);
    assert_eq!(group.participant_names, vec![BOB.to_string(), "Alice Smith".to_string()]);

    let direct = &chats[1];
    assert_eq!(direct.name, "Alice Smith");
    assert_eq!(direct.initials, "AS");
    assert_eq!(direct.preview, "hey alice how are you");
    assert!(direct.is_from_me);
    assert_eq!(direct.timestamp.map(|t| t.timestamp()), Some(978_307_200));

    let carol = &chats[2];
    assert_eq!(carol.name, CAROL);
    assert_eq!(carol.preview, "Attachment");

    let unnamed = &chats[3];
    assert_eq!(unnamed.name, BOB);
    assert_eq!(unnamed.preview, "No message");
}

#[test]
fn recent_chats_respects_limit_and_never_repeats_a_chat() {
    let mut fx = open_fixture();
    for limit in [0, 1, 2, 3, 10] {
        let chats = fx.bridge.recent_chats(limit).unwrap();
        assert!(chats.len() <= limit as usize);

        let unique: HashSet<i64> = chats.iter().map(|c| c.id).collect();
        assert_eq!(unique.len(), chats.len());
    }
}

#[test]
fn names_are_resolved_in_one_batch() {
    let mut fx = open_fixture();
    fx.bridge.recent_chats(50).unwrap();

    let builds = &fx.bridge.resolver().builds;
    assert_eq!(builds.len(), 1);
    let expected: HashSet<String> = [ALICE, BOB, CAROL].iter().map(|h| h.to_string()).collect();
    assert_eq!(builds[0], expected);
}

#[test]
fn identical_polls_are_byte_for_byte_equal() {
    let mut fx = open_fixture();
    let first = fx.bridge.recent_chats(50).unwrap();
    fx.bridge.refresh().unwrap();
    let second = fx.bridge.recent_chats(50).unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn refresh_picks_up_new_messages() {
    let mut fx = open_fixture();
    assert_eq!(fx.bridge.recent_chats(1).unwrap()[0].id, 2);

    let writer = Connection::open(&fx.source).unwrap();
    insert(&writer, text(3, 3, 400, false, "back online"));
    drop(writer);

    // Reads stay on the old snapshot until refreshed.
    assert_eq!(fx.bridge.recent_chats(1).unwrap()[0].id, 2);

    fx.bridge.refresh().unwrap();
    let latest = fx.bridge.recent_chats(1).unwrap();
    assert_eq!(latest[0].id, 3);
    assert_eq!(latest[0].preview, "back online");
}

#[test]
fn blob_only_messages_show_their_text() {
    let mut fx = open_fixture();
    let long_body = "lorem ".repeat(50);

    let writer = Connection::open(&fx.source).unwrap();
    writer
        .execute_batch(&format!(
            "INSERT INTO handle (id) VALUES ('{ALICE_EMAIL}');
             INSERT INTO chat (chat_identifier, display_name) VALUES ('chat;+;alice-twice', NULL);
             INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (6, 1);
             INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (6, 4);
             INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (6, 2);"
        ))
        .unwrap();
    insert_blob(&writer, 6, 1, 500, &typedstream(&long_body));
    insert_blob(&writer, 6, 4, 600, &typedstream("  see   you\nsoon "));
    drop(writer);
    fx.bridge.refresh().unwrap();

    let messages = fx.bridge.messages_in_chat(6, 10).unwrap();
    let kinds: Vec<MessageKind> = messages.iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![MessageKind::Text, MessageKind::Text]);
    assert_eq!(long_body.len(), 300);
    assert_eq!(messages[0].text, long_body);
    assert_eq!(messages[1].text, "  see   you\nsoon ");

    let chats = fx.bridge.recent_chats(1).unwrap();
    let chat = &chats[0];
    assert_eq!(chat.id, 6);
    assert_eq!(chat.name, "Alice Smith");
    assert_eq!(chat.preview, "see you soon");
    assert_eq!(
        chat.participants,
        vec![ALICE.to_string(), ALICE_EMAIL.to_string(), BOB.to_string()]
    );
    // Two handles of one person collapse to one name.
    assert_eq!(chat.participant_names, vec!["Alice Smith".to_string(), BOB.to_string()]);
}

#[test]
fn config_defaults_to_private_snapshot() {
    let config = BridgeConfig::new("/data/chat.db");
    assert_eq!(config.source, PathBuf::from("/data/chat.db"));
    assert_eq!(config.snapshot, tapback_db::default_snapshot_path());
}

#[test]
fn messages_in_chat_oldest_first() {
    let mut fx = open_fixture();
    let messages = fx.bridge.messages_in_chat(2, 10).unwrap();

    let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![3, 4]);
    assert_eq!(messages[0].kind, MessageKind::Text);
    assert_eq!(messages[0].text, "who's in");
    assert_eq!(messages[1].kind, MessageKind::Reaction);
    assert_eq!(messages[1].text, "Reaction");

    let last_one = fx.bridge.messages_in_chat(2, 1).unwrap();
    assert_eq!(last_one.len(), 1);
    assert_eq!(last_one[0].id, 4);
}

#[test]
fn recent_messages_oldest_first() {
    let mut fx = open_fixture();
    let messages = fx.bridge.recent_messages(3).unwrap();
    let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![3, 2, 4]);
}

#[test]
fn latest_conversations_group_by_chat() {
    let mut fx = open_fixture();
    let conversations = fx.bridge.latest_conversations(2, 1).unwrap();

    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0].chat_id, 2);
    assert_eq!(conversations[0].messages[0].id, 4);
    assert_eq!(conversations[1].chat_id, 1);
    assert_eq!(conversations[1].messages[0].id, 2);
}

#[test]
fn sender_labels() {
    let mut fx = open_fixture();
    let messages = fx.bridge.messages_in_chat(1, 10).unwrap();

    assert_eq!(fx.bridge.sender_label(&messages[0]), "Alice Smith");
    assert_eq!(fx.bridge.sender_label(&messages[1]), "me");

    let group = fx.bridge.messages_in_chat(2, 10).unwrap();
    assert_eq!(fx.bridge.sender_label(&group[0]), BOB);
}

#[test]
fn send_routes_by_participant_count() {
    let mut fx = open_fixture();
    let chats = fx.bridge.recent_chats(50).unwrap();

    fx.bridge.send(&chats[1], "on my way").unwrap();
    fx.bridge.send(&chats[0], r#"say "hi" \ bye"#).unwrap();

    let scripts = fx.scripts.borrow();
    assert_eq!(scripts.len(), 2);
    assert!(scripts[0].contains(&format!("send \"on my way\" to buddy \"{ALICE}\"")));
    assert!(scripts[1].contains(&format!("first chat whose id is \"{GROUP_ID}\"")));
    assert!(scripts[1].contains(r#"send "say \"hi\" \\ bye" to targetChat"#));
}

#[test]
fn send_to_chat_looks_up_routing() {
    let fx = open_fixture();

    fx.bridge.send_to_chat(3, "hello").unwrap();
    fx.bridge.send_to_chat(4, "hello all").unwrap();

    let scripts = fx.scripts.borrow();
    assert!(scripts[0].contains(&format!("to buddy \"{CAROL}\"")));
    assert!(scripts[1].contains("first chat whose id is \"chat;+;nobody\""));
}

#[test]
fn group_without_identifier_is_never_sent() {
    let fx = open_fixture();

    let result = fx.bridge.send_to_chat(5, "hello");
    assert!(matches!(result, Err(BridgeError::Configuration(_))));
    assert!(fx.scripts.borrow().is_empty());
}

#[test]
fn missing_source_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = BridgeConfig {
        source: dir.path().join("absent.db"),
        snapshot: dir.path().join("snapshot/chat.db"),
    };
    let result = Bridge::open(&config, RecordingResolver::default(), RecordingRunner::default());
    assert!(matches!(result, Err(BridgeError::Io(_))));
}
