//! Line-oriented textual codec for messages.
//!
//! A packet is a run of `name: value` header lines, a blank line, then the
//! data section (whose layout the `dataType` header governs). Parsing a
//! serialized message yields an equal message.

use super::{DataType, ElementType, Message, MsgTarget, MsgType};
use crate::error::{Error, ErrorKind, Result};
use crate::variant::MoveVariant;

fn type_str(ty: MsgType) -> &'static str {
    match ty {
        MsgType::Void => "void",
        MsgType::Request => "request",
        MsgType::Response => "response",
        MsgType::Event => "event",
    }
}

fn parse_type(s: &str) -> Result<MsgType> {
    match s {
        "void" => Ok(MsgType::Void),
        "request" => Ok(MsgType::Request),
        "response" => Ok(MsgType::Response),
        "event" => Ok(MsgType::Event),
        _ => Err(Error::invalid_value(format!("unknown message type '{}'", s))),
    }
}

fn target_str(t: MsgTarget) -> &'static str {
    match t {
        MsgTarget::Session => "session",
        MsgTarget::Workspace => "workspace",
        MsgTarget::PlainWindow => "plainwindow",
        MsgTarget::TabbedWindow => "tabbedwindow",
        MsgTarget::Tabpage => "tabpage",
        MsgTarget::Dom => "dom",
        MsgTarget::Thread => "thread",
    }
}

fn parse_target(s: &str) -> Result<MsgTarget> {
    match s {
        "session" => Ok(MsgTarget::Session),
        "workspace" => Ok(MsgTarget::Workspace),
        "plainwindow" => Ok(MsgTarget::PlainWindow),
        "tabbedwindow" => Ok(MsgTarget::TabbedWindow),
        "tabpage" => Ok(MsgTarget::Tabpage),
        "dom" => Ok(MsgTarget::Dom),
        "thread" => Ok(MsgTarget::Thread),
        _ => Err(Error::invalid_value(format!("unknown target '{}'", s))),
    }
}

fn element_type_str(t: ElementType) -> &'static str {
    match t {
        ElementType::Void => "void",
        ElementType::Css => "css",
        ElementType::Xpath => "xpath",
        ElementType::Handle => "handle",
        ElementType::Handles => "handles",
        ElementType::Id => "id",
    }
}

fn parse_element_type(s: &str) -> Result<ElementType> {
    match s {
        "void" => Ok(ElementType::Void),
        "css" => Ok(ElementType::Css),
        "xpath" => Ok(ElementType::Xpath),
        "handle" => Ok(ElementType::Handle),
        "handles" => Ok(ElementType::Handles),
        "id" => Ok(ElementType::Id),
        _ => Err(Error::invalid_value(format!("unknown element type '{}'", s))),
    }
}

fn data_type_str(t: DataType) -> &'static str {
    match t {
        DataType::Void => "void",
        DataType::Ejson => "ejson",
        DataType::Text => "text",
    }
}

fn parse_data_type(s: &str) -> Result<DataType> {
    match s {
        "void" => Ok(DataType::Void),
        "ejson" => Ok(DataType::Ejson),
        "text" => Ok(DataType::Text),
        _ => Err(Error::invalid_value(format!("unknown data type '{}'", s))),
    }
}

fn json_text(mv: &MoveVariant, out: &mut String) {
    use std::fmt::Write;
    match mv {
        MoveVariant::Undefined | MoveVariant::Null => out.push_str("null"),
        MoveVariant::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        MoveVariant::Number(n) | MoveVariant::LongDouble(n) => {
            let _ = write!(out, "{}", n);
        }
        MoveVariant::LongInt(n) => {
            let _ = write!(out, "{}", n);
        }
        MoveVariant::ULongInt(n) => {
            let _ = write!(out, "{}", n);
        }
        MoveVariant::String(s) => {
            let _ = write!(out, "{}", serde_json::Value::from(s.to_string()));
        }
        MoveVariant::ByteSeq(b) => {
            out.push_str("\"bx");
            for byte in b.iter() {
                let _ = write!(out, "{:02x}", byte);
            }
            out.push('"');
        }
        MoveVariant::Array(items) | MoveVariant::Tuple(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                json_text(v, out);
            }
            out.push(']');
        }
        MoveVariant::Object(entries) => {
            out.push('{');
            for (i, (k, v)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}:", serde_json::Value::from(k.to_string()));
                json_text(v, out);
            }
            out.push('}');
        }
        MoveVariant::Set { members, .. } => {
            out.push('[');
            for (i, v) in members.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                json_text(v, out);
            }
            out.push(']');
        }
    }
}

fn from_json(value: &serde_json::Value) -> MoveVariant {
    match value {
        serde_json::Value::Null => MoveVariant::Null,
        serde_json::Value::Bool(b) => MoveVariant::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                MoveVariant::LongInt(i)
            } else if let Some(u) = n.as_u64() {
                MoveVariant::ULongInt(u)
            } else {
                MoveVariant::Number(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => MoveVariant::string(s.clone()),
        serde_json::Value::Array(items) => {
            MoveVariant::Array(items.iter().map(from_json).collect())
        }
        serde_json::Value::Object(map) => MoveVariant::Object(
            map.iter()
                .map(|(k, v)| (Box::from(k.as_str()), from_json(v)))
                .collect(),
        ),
    }
}

/// Serialize a message to its textual packet form.
pub fn serialize(msg: &Message) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    let _ = writeln!(out, "type: {}", type_str(msg.ty));
    let _ = writeln!(
        out,
        "target: {}/{}",
        target_str(msg.target),
        msg.target_value
    );
    if let Some(op) = msg.operation.as_ref().and_then(|v| v.as_str()) {
        let _ = writeln!(out, "operation: {}", op);
    }
    if let Some(ev) = msg.event.as_ref().and_then(|v| v.as_str()) {
        let _ = writeln!(out, "event: {}", ev);
    }
    if let Some(el) = msg.element.as_ref().and_then(|v| v.as_str()) {
        let _ = writeln!(out, "element: {}/{}", element_type_str(msg.element_type), el);
    }
    if let Some(prop) = msg.property.as_ref().and_then(|v| v.as_str()) {
        let _ = writeln!(out, "property: {}", prop);
    }
    if let Some(id) = msg.request_id.as_ref().and_then(|v| v.as_str()) {
        let _ = writeln!(out, "requestId: {}", id);
    }
    if let Some(id) = &msg.timer_id {
        let _ = writeln!(out, "timerId: {}", id);
    }
    if msg.ty == MsgType::Response {
        let _ = writeln!(out, "retCode: {}", msg.ret_code);
        let _ = writeln!(out, "resultValue: {}", msg.result_value);
    }
    let _ = writeln!(out, "dataType: {}", data_type_str(msg.data_type));
    out.push('\n');
    match (&msg.data, msg.data_type) {
        (Some(d), DataType::Ejson) => json_text(d, &mut out),
        (Some(d), DataType::Text) => {
            if let Some(s) = d.as_str() {
                out.push_str(s);
            }
        }
        _ => {}
    }
    out
}

/// Parse a textual packet back into a message.
pub fn parse(packet: &str) -> Result<Message> {
    let mut msg = Message::void();
    let mut lines = packet.split('\n');
    let mut saw_type = false;

    for line in lines.by_ref() {
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(": ")
            .ok_or_else(|| Error::invalid_value(format!("malformed header line '{}'", line)))?;
        match name {
            "type" => {
                msg.ty = parse_type(value)?;
                saw_type = true;
            }
            "target" => {
                let (t, v) = value
                    .split_once('/')
                    .ok_or_else(|| Error::invalid_value("malformed target"))?;
                msg.target = parse_target(t)?;
                msg.target_value = v
                    .parse()
                    .map_err(|_| Error::invalid_value("bad target value"))?;
            }
            "operation" => msg.operation = Some(MoveVariant::string(value)),
            "event" => msg.event = Some(MoveVariant::string(value)),
            "element" => {
                let (t, v) = value
                    .split_once('/')
                    .ok_or_else(|| Error::invalid_value("malformed element"))?;
                msg.element_type = parse_element_type(t)?;
                msg.element = Some(MoveVariant::string(v));
            }
            "property" => msg.property = Some(MoveVariant::string(value)),
            "requestId" => msg.request_id = Some(MoveVariant::string(value)),
            "timerId" => msg.timer_id = Some(Box::from(value)),
            "retCode" => {
                msg.ret_code = value
                    .parse()
                    .map_err(|_| Error::invalid_value("bad retCode"))?;
            }
            "resultValue" => {
                msg.result_value = value
                    .parse()
                    .map_err(|_| Error::invalid_value("bad resultValue"))?;
            }
            "dataType" => msg.data_type = parse_data_type(value)?,
            _ => {
                return Err(Error::invalid_value(format!(
                    "unknown header '{}'",
                    name
                )));
            }
        }
    }

    if !saw_type {
        return Err(Error::new(ErrorKind::Incompleted));
    }

    let data_text: String = lines.collect::<Vec<_>>().join("\n");
    match msg.data_type {
        DataType::Void => {}
        DataType::Text => msg.data = Some(MoveVariant::string(data_text)),
        DataType::Ejson => {
            let json: serde_json::Value = serde_json::from_str(&data_text)
                .map_err(|e| Error::invalid_value(format!("bad ejson data: {}", e)))?;
            msg.data = Some(from_json(&json));
        }
    }

    Ok(msg)
}
