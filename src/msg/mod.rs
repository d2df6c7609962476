//! Messages exchanged between instances and with the renderer.
//!
//! The message shape mirrors the renderer wire protocol: a typed header
//! (request / response / event / void) plus payload slots. Payload values
//! are move-heap variants so a queued message is Send and never aliases
//! instance-heap data.

pub mod codec;
pub mod move_buffer;
pub mod queue;

pub use move_buffer::{
    create_move_buffer, destroy_move_buffer, move_message, registered_queue, MoveBufferFlags,
    MOVE_BUFFER_BROADCAST,
};
pub use queue::MsgQueue;

use crate::variant::MoveVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Void,
    Request,
    Response,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgTarget {
    Session,
    Workspace,
    PlainWindow,
    TabbedWindow,
    Tabpage,
    Dom,
    Thread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Void,
    Css,
    Xpath,
    Handle,
    Handles,
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Void,
    Ejson,
    Text,
}

/// A runtime message. Cloning a message deep-copies its payload slots;
/// two clones never alias.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub ty: MsgType,
    pub target: MsgTarget,
    pub target_value: u64,
    pub element_type: ElementType,
    pub data_type: DataType,
    pub ret_code: u32,
    pub result_value: u64,

    pub operation: Option<MoveVariant>,
    pub event: Option<MoveVariant>,
    pub element: Option<MoveVariant>,
    pub property: Option<MoveVariant>,
    pub request_id: Option<MoveVariant>,
    pub data: Option<MoveVariant>,

    /// Present on timer-expiry events; routes the message to the queue's
    /// timer list.
    pub timer_id: Option<Box<str>>,
}

impl Message {
    pub fn void() -> Message {
        Message {
            ty: MsgType::Void,
            target: MsgTarget::Session,
            target_value: 0,
            element_type: ElementType::Void,
            data_type: DataType::Void,
            ret_code: 0,
            result_value: 0,
            operation: None,
            event: None,
            element: None,
            property: None,
            request_id: None,
            data: None,
            timer_id: None,
        }
    }

    pub fn request(
        target: MsgTarget,
        target_value: u64,
        operation: &str,
        request_id: &str,
    ) -> Message {
        Message {
            ty: MsgType::Request,
            target,
            target_value,
            operation: Some(MoveVariant::string(operation)),
            request_id: Some(MoveVariant::string(request_id)),
            ..Message::void()
        }
    }

    pub fn response(request_id: &str, ret_code: u32, result_value: u64) -> Message {
        Message {
            ty: MsgType::Response,
            request_id: Some(MoveVariant::string(request_id)),
            ret_code,
            result_value,
            ..Message::void()
        }
    }

    pub fn event(target: MsgTarget, target_value: u64, event: &str) -> Message {
        Message {
            ty: MsgType::Event,
            target,
            target_value,
            event: Some(MoveVariant::string(event)),
            ..Message::void()
        }
    }

    pub fn with_element(mut self, ty: ElementType, value: &str) -> Message {
        self.element_type = ty;
        self.element = Some(MoveVariant::string(value));
        self
    }

    pub fn with_property(mut self, property: &str) -> Message {
        self.property = Some(MoveVariant::string(property));
        self
    }

    pub fn with_ejson_data(mut self, data: MoveVariant) -> Message {
        self.data_type = DataType::Ejson;
        self.data = Some(data);
        self
    }

    pub fn with_text_data(mut self, data: &str) -> Message {
        self.data_type = DataType::Text;
        self.data = Some(MoveVariant::string(data));
        self
    }

    pub fn with_timer_id(mut self, id: &str) -> Message {
        self.timer_id = Some(Box::from(id));
        self
    }

    pub fn event_name(&self) -> Option<&str> {
        self.event.as_ref().and_then(|e| e.as_str())
    }

    pub fn request_id_str(&self) -> Option<&str> {
        self.request_id.as_ref().and_then(|r| r.as_str())
    }
}

/// Field-wise message comparison; 0 when semantically equal.
pub fn compare_messages(a: &Message, b: &Message) -> i32 {
    if a == b {
        0
    } else {
        1
    }
}
