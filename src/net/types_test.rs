use super::*;

fn user_ref(id: UserId, username: &str) -> UserRef {
    UserRef { id, username: username.to_owned(), avatar: None }
}

#[test]
fn room_deserializes_with_defaults() {
    let room: Room = serde_json::from_value(serde_json::json!({"id": 7, "name": "general"})).unwrap();
    assert_eq!(room.id, 7);
    assert_eq!(room.unread_count, 0);
    assert!(room.last_message.is_none());
    assert!(room.members.is_empty());
    assert!(!room.is_direct);
}

#[test]
fn direct_room_displays_recipient_name() {
    let room = Room {
        id: 1,
        name: "dm-3-4".to_owned(),
        unread_count: 0,
        last_message: None,
        members: vec![user_ref(3, "ann"), user_ref(4, "bob")],
        is_direct: true,
        recipient: Some(user_ref(4, "bob")),
    };
    assert_eq!(room.display_name(), "bob");
}

#[test]
fn group_room_displays_its_name_even_with_recipient() {
    let room = Room {
        id: 1,
        name: "general".to_owned(),
        unread_count: 0,
        last_message: None,
        members: Vec::new(),
        is_direct: false,
        recipient: Some(user_ref(4, "bob")),
    };
    assert_eq!(room.display_name(), "general");
}

#[test]
fn room_update_serializes_only_present_fields() {
    let update = RoomUpdate { name: Some("renamed".to_owned()), member_ids: None };
    assert_eq!(serde_json::to_value(&update).unwrap(), serde_json::json!({"name": "renamed"}));
    assert_eq!(serde_json::to_value(RoomUpdate::default()).unwrap(), serde_json::json!({}));
}

#[test]
fn registration_omits_missing_email() {
    let registration = Registration { username: "ann".to_owned(), password: "pw".to_owned(), email: None };
    let value = serde_json::to_value(&registration).unwrap();
    assert!(value.get("email").is_none());
}

#[test]
fn new_message_emptiness_ignores_whitespace() {
    assert!(NewMessage::text("   ").is_empty());
    assert!(!NewMessage::text("hi").is_empty());

    let with_file = NewMessage {
        attachments: vec![Upload {
            file_name: "a.png".to_owned(),
            mime_type: "image/png".to_owned(),
            bytes: vec![1, 2, 3],
        }],
        ..NewMessage::default()
    };
    assert!(!with_file.is_empty());
}
