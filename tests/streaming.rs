/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use mail_stream::{
    Abort, Address, ContentDisposition, ContentId, ContentType, DateTime, MessageHandler,
    MessageParser, MimeVersion, ObsoleteKind, ParseError,
};

#[derive(Debug, PartialEq, Clone)]
enum Event {
    Start(Option<String>),
    End(Option<String>),
    ContentType(String, Vec<(String, String)>),
    ContentDisposition(String),
    TransferEncoding(String),
    ContentId(String),
    ContentDescription(String),
    MimeVersion,
    EndHeaders,
    Header(String, String),
    UnexpectedHeader(String, String),
    Date(String, String),
    Addresses(String, Vec<String>),
    MessageIds(String, Vec<String>),
    Obsolete(ObsoleteKind),
    Body(Vec<u8>),
    Unexpected(Vec<u8>),
}

#[derive(Default)]
struct Collector {
    events: Vec<Event>,
    fail_on_body: bool,
}

impl Collector {
    /// Merges adjacent body and unexpected-content events; their
    /// granularity legitimately depends on input fragmentation.
    fn normalized(&self) -> Vec<Event> {
        let mut result: Vec<Event> = Vec::with_capacity(self.events.len());
        for event in &self.events {
            let merged = match (result.last_mut(), event) {
                (Some(Event::Body(acc)), Event::Body(bytes)) => {
                    acc.extend_from_slice(bytes);
                    true
                }
                (Some(Event::Unexpected(acc)), Event::Unexpected(bytes)) => {
                    acc.extend_from_slice(bytes);
                    true
                }
                _ => false,
            };
            if !merged {
                result.push(event.clone());
            }
        }
        result
    }
}

fn render_address(address: &Address) -> String {
    match address {
        Address::Addr(addr) => {
            let spec = format!("{}@{}", addr.local_part, addr.domain);
            match &addr.display_name {
                Some(name) => format!("{name} <{spec}>"),
                None => spec,
            }
        }
        Address::Group(group) => format!(
            "{}:{};",
            group.name,
            group
                .addresses
                .iter()
                .map(|addr| format!("{}@{}", addr.local_part, addr.domain))
                .collect::<Vec<_>>()
                .join(",")
        ),
    }
}

impl MessageHandler for Collector {
    fn start_entity(&mut self, boundary: Option<&str>) -> Result<(), Abort> {
        self.events.push(Event::Start(boundary.map(str::to_string)));
        Ok(())
    }

    fn end_entity(&mut self, boundary: Option<&str>) -> Result<(), Abort> {
        self.events.push(Event::End(boundary.map(str::to_string)));
        Ok(())
    }

    fn content_type(&mut self, content_type: &ContentType<'_>) -> Result<(), Abort> {
        self.events.push(Event::ContentType(
            content_type.to_string(),
            content_type
                .attributes()
                .iter()
                .map(|attr| (attr.name.to_string(), attr.value.to_string()))
                .collect(),
        ));
        Ok(())
    }

    fn content_disposition(
        &mut self,
        content_disposition: &ContentDisposition<'_>,
    ) -> Result<(), Abort> {
        self.events
            .push(Event::ContentDisposition(content_disposition.to_string()));
        Ok(())
    }

    fn content_transfer_encoding(&mut self, encoding: &str) -> Result<(), Abort> {
        self.events.push(Event::TransferEncoding(encoding.into()));
        Ok(())
    }

    fn content_id(&mut self, content_id: &ContentId<'_>) -> Result<(), Abort> {
        self.events.push(Event::ContentId(content_id.to_string()));
        Ok(())
    }

    fn content_description(&mut self, text: &str) -> Result<(), Abort> {
        self.events.push(Event::ContentDescription(text.into()));
        Ok(())
    }

    fn mime_version(&mut self, _version: MimeVersion) -> Result<(), Abort> {
        self.events.push(Event::MimeVersion);
        Ok(())
    }

    fn end_headers(&mut self) -> Result<(), Abort> {
        self.events.push(Event::EndHeaders);
        Ok(())
    }

    fn header(&mut self, name: &str, text: &str) -> Result<(), Abort> {
        self.events.push(Event::Header(name.into(), text.into()));
        Ok(())
    }

    fn unexpected_header(&mut self, name: &str, raw_value: &str) -> Result<(), Abort> {
        self.events
            .push(Event::UnexpectedHeader(name.into(), raw_value.into()));
        Ok(())
    }

    fn date_header(&mut self, name: &str, datetime: DateTime) -> Result<(), Abort> {
        self.events
            .push(Event::Date(name.into(), datetime.to_rfc3339()));
        Ok(())
    }

    fn address_header(&mut self, name: &str, addresses: &[Address<'_>]) -> Result<(), Abort> {
        self.events.push(Event::Addresses(
            name.into(),
            addresses.iter().map(render_address).collect(),
        ));
        Ok(())
    }

    fn message_id_header(&mut self, name: &str, ids: &[ContentId<'_>]) -> Result<(), Abort> {
        self.events.push(Event::MessageIds(
            name.into(),
            ids.iter()
                .map(|id| format!("{}@{}", id.local_part, id.domain))
                .collect(),
        ));
        Ok(())
    }

    fn obsolete_structure(&mut self, kind: ObsoleteKind) -> Result<(), Abort> {
        self.events.push(Event::Obsolete(kind));
        Ok(())
    }

    fn body_content(&mut self, bytes: &[u8]) -> Result<(), Abort> {
        if self.fail_on_body {
            return Err(Abort::new("body rejected"));
        }
        self.events.push(Event::Body(bytes.to_vec()));
        Ok(())
    }

    fn unexpected_content(&mut self, bytes: &[u8]) -> Result<(), Abort> {
        self.events.push(Event::Unexpected(bytes.to_vec()));
        Ok(())
    }
}

fn parse_all(input: &[u8]) -> Vec<Event> {
    let mut parser = MessageParser::new(Collector::default());
    parser.receive(input).unwrap();
    parser.close().unwrap();
    parser.into_handler().normalized()
}

fn parse_chunked(input: &[u8], chunk_size: usize) -> Vec<Event> {
    let mut parser = MessageParser::new(Collector::default());
    for chunk in input.chunks(chunk_size) {
        parser.receive(chunk).unwrap();
    }
    parser.close().unwrap();
    parser.into_handler().normalized()
}

#[test]
fn address_header_events() {
    assert_eq!(
        parse_all(b"To: \"John Doe\" <john@example.com>, jane@example.com\r\n\r\n"),
        [
            Event::Start(None),
            Event::Addresses(
                "To".into(),
                vec![
                    "John Doe <john@example.com>".into(),
                    "jane@example.com".into()
                ]
            ),
            Event::EndHeaders,
            Event::End(None),
        ]
    );
}

#[test]
fn message_id_header_events() {
    assert_eq!(
        parse_all(b"References: <a@x.com>,<b@x.com> <c@y.com>\r\n\r\n"),
        [
            Event::Start(None),
            Event::MessageIds(
                "References".into(),
                vec!["a@x.com".into(), "b@x.com".into(), "c@y.com".into()]
            ),
            Event::EndHeaders,
            Event::End(None),
        ]
    );
}

#[test]
fn date_header_events() {
    assert_eq!(
        parse_all(b"Date: Fri, 21 Nov 1997 09:55:06 -0600\r\n\r\n"),
        [
            Event::Start(None),
            Event::Date("Date".into(), "1997-11-21T09:55:06-06:00".into()),
            Event::EndHeaders,
            Event::End(None),
        ]
    );
}

#[test]
fn obsolete_date_events() {
    assert_eq!(
        parse_all(b"Date: 21 Nov 97 09:55 EST\r\n\r\n"),
        [
            Event::Start(None),
            Event::Obsolete(ObsoleteKind::DateTime),
            Event::Date("Date".into(), "1997-11-21T09:55:00-05:00".into()),
            Event::EndHeaders,
            Event::End(None),
        ]
    );
}

#[test]
fn multipart_events() {
    let input = b"Content-Type: multipart/mixed; boundary=X\r\n\r\n\
                  --X\r\n\r\nA\r\n--X\r\n\r\nB\r\n--X--\r\n";

    assert_eq!(
        parse_all(input),
        [
            Event::Start(None),
            Event::ContentType(
                "multipart/mixed".into(),
                vec![("boundary".into(), "X".into())]
            ),
            Event::EndHeaders,
            Event::Start(Some("X".into())),
            Event::EndHeaders,
            Event::Body(b"A".to_vec()),
            Event::End(Some("X".into())),
            Event::Start(Some("X".into())),
            Event::EndHeaders,
            Event::Body(b"B".to_vec()),
            Event::End(Some("X".into())),
            Event::End(None),
        ]
    );
}

#[test]
fn nested_multipart_events() {
    let input = b"Content-Type: multipart/mixed; boundary=outer\r\n\r\n\
                  --outer\r\n\
                  Content-Type: multipart/alternative; boundary=inner\r\n\r\n\
                  --inner\r\n\r\nplain\r\n--inner\r\n\r\nhtml\r\n--inner--\r\n\
                  --outer\r\n\r\ntail part\r\n--outer--\r\n";

    assert_eq!(
        parse_all(input),
        [
            Event::Start(None),
            Event::ContentType(
                "multipart/mixed".into(),
                vec![("boundary".into(), "outer".into())]
            ),
            Event::EndHeaders,
            Event::Start(Some("outer".into())),
            Event::ContentType(
                "multipart/alternative".into(),
                vec![("boundary".into(), "inner".into())]
            ),
            Event::EndHeaders,
            Event::Start(Some("inner".into())),
            Event::EndHeaders,
            Event::Body(b"plain".to_vec()),
            Event::End(Some("inner".into())),
            Event::Start(Some("inner".into())),
            Event::EndHeaders,
            Event::Body(b"html".to_vec()),
            Event::End(Some("inner".into())),
            Event::End(Some("outer".into())),
            Event::Start(Some("outer".into())),
            Event::EndHeaders,
            Event::Body(b"tail part".to_vec()),
            Event::End(Some("outer".into())),
            Event::End(None),
        ]
    );
}

#[test]
fn preamble_and_epilogue_are_unexpected_content() {
    let input = b"Content-Type: multipart/mixed; boundary=X\r\n\r\n\
                  This is the preamble.\r\n\
                  --X\r\n\r\nA\r\n--X--\r\n\
                  This is the epilogue.\r\n";

    let events = parse_all(input);
    assert!(events.contains(&Event::Unexpected(b"This is the preamble.\r\n".to_vec())));
    assert!(events.contains(&Event::Unexpected(b"This is the epilogue.\r\n".to_vec())));
    assert!(events.contains(&Event::Body(b"A".to_vec())));
}

#[test]
fn base64_body_decoding() {
    let events = parse_all(
        b"Content-Transfer-Encoding: base64\r\n\r\nSGVsbG8g\r\nV29ybGQ=\r\n",
    );
    assert!(events.contains(&Event::Body(b"Hello World".to_vec())));
    assert!(events.contains(&Event::TransferEncoding("base64".into())));
}

#[test]
fn quoted_printable_body_in_multipart() {
    let input = b"Content-Type: multipart/mixed; boundary=X\r\n\r\n\
                  --X\r\n\
                  Content-Transfer-Encoding: quoted-printable\r\n\r\n\
                  foo=\r\nbar =C3=A9\r\n--X--\r\n";

    let events = parse_all(input);
    assert!(
        events.contains(&Event::Body("foobar é".as_bytes().to_vec())),
        "events were {events:?}"
    );
}

#[test]
fn unknown_transfer_encoding_is_identity() {
    let events = parse_all(b"Content-Transfer-Encoding: x-unknown\r\n\r\nraw \xff bytes");
    assert!(events.contains(&Event::Body(b"raw \xff bytes".to_vec())));
}

#[test]
fn mime_and_unstructured_headers() {
    let input = b"MIME-Version: 1.0\r\n\
                  Content-Description: =?utf-8?q?a_caf=C3=A9?=\r\n\
                  Content-ID: <part1@example.com>\r\n\
                  Content-Disposition: attachment; filename=a.txt\r\n\
                  Subject: Hello\r\n world\r\n\
                  Received: from mx.example.com by mail.example.com\r\n\
                  X-Custom: anything\r\n\r\n";

    assert_eq!(
        parse_all(input),
        [
            Event::Start(None),
            Event::MimeVersion,
            Event::ContentDescription("a café".into()),
            Event::ContentId("<part1@example.com>".into()),
            Event::ContentDisposition("attachment".into()),
            Event::Header("Subject".into(), "Hello world".into()),
            Event::Header(
                "Received".into(),
                "from mx.example.com by mail.example.com".into()
            ),
            Event::Header("X-Custom".into(), "anything".into()),
            Event::EndHeaders,
            Event::End(None),
        ]
    );
}

#[test]
fn obsolete_address_fallback_precedes_typed_event() {
    let events = parse_all(b"To: @relay.example:user@host.example\r\n\r\n");
    let obsolete_pos = events
        .iter()
        .position(|event| *event == Event::Obsolete(ObsoleteKind::Address))
        .expect("missing obsolete event");
    assert_eq!(
        events[obsolete_pos + 1],
        Event::Addresses("To".into(), vec!["user@host.example".into()])
    );
}

#[test]
fn rfc2231_parameters_are_flagged() {
    let events = parse_all(
        b"Content-Type: application/x-stuff; title*0=\"one\"; title*1=\"two\"\r\n\r\n",
    );
    let obsolete_pos = events
        .iter()
        .position(|event| *event == Event::Obsolete(ObsoleteKind::StructuredParameter))
        .expect("missing obsolete event");
    assert!(matches!(events[obsolete_pos + 1], Event::ContentType(..)));
}

#[test]
fn undecodable_header_is_demoted() {
    let events = parse_all(b"Date: not a date at all\r\n\r\n");
    assert!(events.contains(&Event::UnexpectedHeader(
        "Date".into(),
        "not a date at all".into()
    )));
}

#[test]
fn obsolete_header_syntax_is_flagged() {
    let events = parse_all(b"Subject : spaced colon\r\n\r\n");
    assert_eq!(
        events[1..3],
        [
            Event::Obsolete(ObsoleteKind::HeaderSyntax),
            Event::Header("Subject".into(), "spaced colon".into()),
        ]
    );
}

#[test]
fn chunk_invariance() {
    let inputs: [&[u8]; 4] = [
        b"To: \"John Doe\" <john@example.com>, jane@example.com\r\n\r\n",
        b"Content-Type: multipart/mixed; boundary=X\r\n\r\npreamble\r\n--X\r\n\
          Content-Transfer-Encoding: base64\r\n\r\nSGVsbG8gV29ybGQ=\r\n--X\r\n\
          Content-Transfer-Encoding: quoted-printable\r\n\r\nsoft=\r\nbreak\r\n--X--\r\nepilogue\r\n",
        b"Subject: folded\r\n\theader value\r\nDate: 21 Nov 97 09:55 EST\r\n\r\nplain body\r\nwith lines\r\n",
        b"Content-Type: multipart/mixed; boundary=outer\r\n\r\n--outer\r\n\
          Content-Type: multipart/mixed; boundary=inner\r\n\r\n--inner\r\n\r\nx\r\n--inner--\r\n--outer--\r\n",
    ];

    for input in inputs {
        let whole = parse_all(input);
        for chunk_size in [1, 2, 3, 5, 7, 16] {
            assert_eq!(
                parse_chunked(input, chunk_size),
                whole,
                "fragmentation at {chunk_size} changed the event stream"
            );
        }
    }
}

#[test]
fn close_is_idempotent() {
    let mut parser = MessageParser::new(Collector::default());
    parser.receive(b"Subject: x\r\n\r\nbody").unwrap();
    parser.close().unwrap();
    let after_first = parser.handler().events.clone();
    parser.close().unwrap();
    assert_eq!(parser.handler().events, after_first);
}

#[test]
fn reset_allows_reuse() {
    let mut parser = MessageParser::new(Collector::default());
    parser.receive(b"Subject: one\r\n\r\n").unwrap();
    parser.close().unwrap();
    let first = parser.handler().events.clone();

    parser.reset();
    parser.handler_mut().events.clear();
    parser.receive(b"Subject: one\r\n\r\n").unwrap();
    parser.close().unwrap();

    assert_eq!(parser.handler().events, first);
}

#[test]
fn missing_close_delimiter() {
    let input: &[u8] = b"Content-Type: multipart/mixed; boundary=X\r\n\r\n--X\r\n\r\nA\r\n";

    // Tolerant mode closes implicitly.
    let mut parser = MessageParser::new(Collector::default());
    parser.receive(input).unwrap();
    parser.close().unwrap();
    let events = parser.into_handler().normalized();
    assert_eq!(
        &events[events.len() - 2..],
        [Event::End(Some("X".into())), Event::End(None)]
    );

    // Strict mode fails.
    let mut parser = MessageParser::new(Collector::default());
    parser.set_strict(true);
    parser.receive(input).unwrap();
    assert_eq!(
        parser.close(),
        Err(ParseError::MissingCloseDelimiter("X".into()))
    );
}

#[test]
fn invalid_boundary_is_fatal() {
    let mut parser = MessageParser::new(Collector::default());
    assert_eq!(
        parser.receive(b"Content-Type: multipart/mixed; boundary=\"bad boundary\"\r\n\r\nx"),
        Err(ParseError::InvalidBoundary("bad boundary".into()))
    );
    // Further input is ignored after a fatal error.
    assert_eq!(parser.receive(b"more"), Ok(()));
}

#[test]
fn unterminated_quote_is_fatal() {
    // A quoted string left open across the header block terminator.
    let mut parser = MessageParser::new(Collector::default());
    assert_eq!(
        parser.receive(b"To: \"unclosed\r\n\r\nbody"),
        Err(ParseError::UnterminatedQuote("To".into()))
    );
    // Further input is ignored after a fatal error.
    assert_eq!(parser.receive(b"more"), Ok(()));

    // Same failure when the input ends inside the quoted string.
    let mut parser = MessageParser::new(Collector::default());
    parser.receive(b"To: \"unclosed").unwrap();
    assert_eq!(
        parser.close(),
        Err(ParseError::UnterminatedQuote("To".into()))
    );

    // An escaped quote does not close the string.
    let mut parser = MessageParser::new(Collector::default());
    assert_eq!(
        parser.receive(b"To: \"a\\\"b\r\n\r\n"),
        Err(ParseError::UnterminatedQuote("To".into()))
    );
}

#[test]
fn quoted_string_may_span_a_fold() {
    let events = parse_all(b"To: \"John\r\n Doe\" <john@example.com>\r\n\r\n");
    assert!(events.contains(&Event::Addresses(
        "To".into(),
        vec!["John Doe <john@example.com>".into()]
    )));
}

#[test]
fn buffer_limit_is_enforced() {
    let mut parser = MessageParser::new(Collector::default());
    parser.set_max_buffer_size(64);
    assert_eq!(
        parser.receive(format!("X-Long: {}", "v".repeat(100)).as_bytes()),
        Err(ParseError::BufferLimitExceeded(64))
    );
}

#[test]
fn handler_aborts_propagate() {
    let mut parser = MessageParser::new(Collector {
        fail_on_body: true,
        ..Collector::default()
    });
    assert_eq!(
        parser.receive(b"Subject: x\r\n\r\nbody bytes"),
        Err(ParseError::Aborted("body rejected".into()))
    );
}

#[test]
fn lone_lf_line_termination() {
    assert_eq!(
        parse_all(b"Subject: unix style\n\nbody"),
        [
            Event::Start(None),
            Event::Header("Subject".into(), "unix style".into()),
            Event::EndHeaders,
            Event::Body(b"body".to_vec()),
            Event::End(None),
        ]
    );
}

#[test]
fn smtputf8_switch() {
    let raw = b"Subject: caf\xe9\r\n\r\n";

    // Default: raw bytes are ISO-8859-1.
    let events = parse_all(raw);
    assert!(events.contains(&Event::Header("Subject".into(), "café".into())));

    // SMTPUTF8: raw bytes are UTF-8, malformed sequences replaced.
    let mut parser = MessageParser::new(Collector::default());
    parser.set_smtputf8(true);
    parser.receive(raw).unwrap();
    parser.close().unwrap();
    assert!(parser
        .handler()
        .events
        .contains(&Event::Header("Subject".into(), "caf\u{fffd}".into())));
}
