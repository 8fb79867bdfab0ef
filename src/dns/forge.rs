//! Forged DNS responses.
//!
//! A forged response mirrors the query's id, op code, RD flag and question
//! section, and answers with either nothing (AAAA) or a single A record
//! pointing at the sentinel address. The TTL is zero so the client comes
//! back to us for every new connection.

use std::net::Ipv4Addr;

use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record, RecordType};

/// TTL of forged answers.
pub const FORGED_TTL: u32 = 0;

/// Build the forged response for a query.
///
/// Only the first question decides the answer: an A question gets one
/// answer equal to `sentinel`, anything else gets an empty answer section.
pub fn forge_response(query: &Message, sentinel: Ipv4Addr) -> Message {
    let mut response = Message::new();
    response
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_recursion_desired(query.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(ResponseCode::NoError);

    for q in query.queries() {
        response.add_query(q.clone());
    }

    if let Some(question) = query.queries().first()
        && question.query_type() == RecordType::A
    {
        let mut record =
            Record::from_rdata(question.name().clone(), FORGED_TTL, RData::A(A(sentinel)));
        record.set_dns_class(question.query_class());
        response.add_answer(record);
    }

    response
}
