use std::net::IpAddr;

use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::{DNSClass, RData, RecordType};

/// Builds an empty response to `request`, copying the id, opcode, RD bit and questions.
pub fn get_response_message(request: &Message, response_code: ResponseCode) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(response_code)
        .add_queries(request.queries().iter().cloned());
    response
}

pub fn get_servfail_message(request: &Message) -> Message {
    get_response_message(request, ResponseCode::ServFail)
}

/// Anything but a single IN A/AAAA question with a standard opcode.
pub fn is_unusual(message: &Message) -> bool {
    if message.op_code() != OpCode::Query {
        return true;
    }
    let [query] = message.queries() else {
        return true;
    };

    query.query_class() != DNSClass::IN || !matches!(query.query_type(), RecordType::A | RecordType::AAAA)
}

/// Addresses of every A and AAAA record in the answer section
pub fn answer_ips(message: &Message) -> impl Iterator<Item = IpAddr> + '_ {
    message.answers().iter().filter_map(|record| match record.data() {
        RData::A(a) => Some(IpAddr::V4(a.0)),
        RData::AAAA(aaaa) => Some(IpAddr::V6(aaaa.0)),
        _ => None,
    })
}

/// Renders the question section for logs, e.g. `example.com. IN A`.
pub fn format_queries(message: &Message) -> String {
    message
        .queries()
        .iter()
        .map(|query| format!("{} {} {}", query.name(), query.query_class(), query.query_type()))
        .collect::<Vec<_>>()
        .join(", ")
}
