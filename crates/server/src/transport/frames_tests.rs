// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn client_frames_parse_by_type_tag() -> anyhow::Result<()> {
    let frame: ClientFrame = serde_json::from_str(r#"{"type":"input","data":"ls\n"}"#)?;
    assert!(matches!(frame, ClientFrame::Input { ref data, binary: false } if data == "ls\n"));

    let frame: ClientFrame = serde_json::from_str(r#"{"type":"resize","cols":120,"rows":40}"#)?;
    assert!(matches!(frame, ClientFrame::Resize { cols: 120, rows: 40 }));

    let frame: ClientFrame =
        serde_json::from_str(r#"{"type":"keyboard_command","data":"make test\n"}"#)?;
    assert!(matches!(frame, ClientFrame::KeyboardCommand { .. }));

    let frame: ClientFrame = serde_json::from_str(r#"{"type":"scroll","data":-3}"#)?;
    assert!(matches!(frame, ClientFrame::Scroll { data: -3 }));

    let frame: ClientFrame = serde_json::from_str(r#"{"type":"keepalive"}"#)?;
    assert!(matches!(frame, ClientFrame::Keepalive {}));
    Ok(())
}

#[test]
fn unknown_type_rejected() {
    assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"exec","data":"rm"}"#).is_err());
}

#[test]
fn input_bytes_utf8_and_base64() -> anyhow::Result<()> {
    let plain = ClientFrame::Input { data: "hello".to_owned(), binary: false };
    assert_eq!(plain.input_bytes().ok_or_else(|| anyhow::anyhow!("none"))?.as_ref(), b"hello");

    let encoded = ClientFrame::Input { data: B64.encode(b"\x1b[A"), binary: true };
    assert_eq!(
        encoded.input_bytes().ok_or_else(|| anyhow::anyhow!("none"))?.as_ref(),
        b"\x1b[A"
    );

    let resize = ClientFrame::Resize { cols: 1, rows: 1 };
    assert!(resize.input_bytes().is_none());
    Ok(())
}

#[test]
fn output_frame_picks_encoding() -> anyhow::Result<()> {
    let text = ServerFrame::output(b"plain text");
    let json = serde_json::to_value(&text)?;
    assert_eq!(json["type"], "output");
    assert_eq!(json["data"], "plain text");
    assert!(json.get("binary").is_none());

    let binary = ServerFrame::output(&[0xff, 0xfe, 0x00]);
    let json = serde_json::to_value(&binary)?;
    assert_eq!(json["binary"], true);
    let decoded = B64.decode(json["data"].as_str().unwrap_or_default())?;
    assert_eq!(decoded, vec![0xff, 0xfe, 0x00]);
    Ok(())
}

#[test]
fn server_frame_tags() -> anyhow::Result<()> {
    assert_eq!(
        serde_json::to_value(ServerFrame::PtyClosed {})?["type"],
        "pty_closed"
    );
    assert_eq!(
        serde_json::to_value(ServerFrame::Keepalive {})?["type"],
        "keepalive"
    );
    let err = ServerFrame::error(crate::error::ErrorCode::Validation, "bad frame");
    let json = serde_json::to_value(&err)?;
    assert_eq!(json["type"], "error");
    assert_eq!(json["code"], "VALIDATION");
    Ok(())
}

#[test]
fn notification_frame_shape() -> anyhow::Result<()> {
    let frame = ServerFrame::Notification {
        message: "hi".to_owned(),
        strategy: Some("webhook".to_owned()),
        action: Some("notify".to_owned()),
    };
    let json = serde_json::to_value(&frame)?;
    assert_eq!(json["type"], "notification");
    assert_eq!(json["message"], "hi");
    assert_eq!(json["strategy"], "webhook");
    Ok(())
}
