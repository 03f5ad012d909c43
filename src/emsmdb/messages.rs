//-
// Copyright (c) 2026, Jason Lingle
//
// This file is part of Mapistore.
//
// Mapistore is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mapistore is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mapistore. If not, see <http://www.gnu.org/licenses/>.

//! Message and attachment operations.

use log::info;

use super::defs::*;
use super::handles::{AttachmentObject, MessageObject, Object};
use super::table::{TableBinding, TableObject, TableParent};
use crate::store::model::*;
use crate::support::error::Error;

impl RopProcessor {
    pub(super) fn cmd_open_message(
        &mut self,
        folder: u32,
        mid: MessageId,
    ) -> RopResult {
        let folder = object!(self, folder, Folder)?;
        let handle = self
            .registry
            .open_message(folder.context, folder.handle, mid)
            .map_err(map_error!(self))?;
        self.bind_message(folder.context, mid, handle)
    }

    pub(super) fn cmd_create_message(
        &mut self,
        folder: u32,
        mid: MessageId,
        associated: bool,
    ) -> RopResult {
        let folder = object!(self, folder, Folder)?;
        let handle = self
            .registry
            .create_message(folder.context, folder.handle, mid, associated)
            .map_err(map_error!(self, Exists => Collision,))?;
        self.bind_message(folder.context, mid, handle)
    }

    /// Deletes each message in `mids`, stopping at the first failure.
    pub(super) fn cmd_delete_messages(
        &mut self,
        folder: u32,
        mids: Vec<MessageId>,
        hard_delete: bool,
    ) -> RopResult {
        let folder = object!(self, folder, Folder)?;
        let mode = if hard_delete {
            MessageDeleteMode::Permanent
        } else {
            MessageDeleteMode::Soft
        };

        for mid in mids {
            self.registry
                .delete_message(folder.context, folder.handle, mid, mode)
                .map_err(map_error!(self))?;
        }

        Ok(RopReply::ok(ReplyBody::Empty))
    }

    pub(super) fn cmd_modify_recipients(
        &mut self,
        message: u32,
        rows: Vec<RecipientRow>,
    ) -> RopResult {
        let message = object!(self, message, Message)?;
        self.registry
            .modify_recipients(message.context, message.handle, &rows)
            .map_err(map_error!(self))?;
        Ok(RopReply::ok(ReplyBody::Empty))
    }

    pub(super) fn cmd_save_changes_message(&mut self, message: u32) -> RopResult {
        let message = object!(self, message, Message)?;
        self.registry
            .save_message(message.context, message.handle)
            .map_err(map_error!(self))?;
        Ok(RopReply::ok(ReplyBody::Empty))
    }

    pub(super) fn cmd_submit_message(
        &mut self,
        message: u32,
        flags: SubmitFlags,
    ) -> RopResult {
        let message = object!(self, message, Message)?;
        self.registry
            .submit_message(message.context, message.handle, flags)
            .map_err(map_error!(self))?;
        info!("{} Submitted message {:?}", self.log_prefix, message.mid);
        Ok(RopReply::ok(ReplyBody::Empty))
    }

    pub(super) fn cmd_get_attachment_table(&mut self, message: u32) -> RopResult {
        let message = object!(self, message, Message)?;
        let (table, row_count) = self
            .registry
            .get_attachment_table(message.context, message.handle)
            .map_err(map_error!(self))?;
        let table = TableObject::new(
            Some(TableParent::Message(message.mid)),
            TableKind::Attachment,
            row_count,
            Some(TableBinding {
                context: message.context,
                handle: table,
            }),
        );

        let handle = self.bind(message.context, Object::Table(table))?;
        Ok(RopReply::ok(ReplyBody::Table { handle, row_count }))
    }

    pub(super) fn cmd_open_attach(
        &mut self,
        message: u32,
        attach_num: u32,
    ) -> RopResult {
        let message = object!(self, message, Message)?;
        let handle = self
            .registry
            .open_attachment(message.context, message.handle, attach_num)
            .map_err(map_error!(self))?;
        self.bind_attachment(message.context, attach_num, handle)
    }

    pub(super) fn cmd_create_attach(&mut self, message: u32) -> RopResult {
        let message = object!(self, message, Message)?;
        let (handle, attach_num) = self
            .registry
            .create_attachment(message.context, message.handle)
            .map_err(map_error!(self))?;
        self.bind_attachment(message.context, attach_num, handle)
    }

    pub(super) fn cmd_open_embedded_message(
        &mut self,
        attachment: u32,
    ) -> RopResult {
        let attachment = object!(self, attachment, Attachment)?;
        let (handle, mid) = self
            .registry
            .open_embedded_message(attachment.context, attachment.handle)
            .map_err(map_error!(self))?;
        self.bind_message(attachment.context, mid, handle)
    }

    fn bind_message(
        &mut self,
        context: ContextId,
        mid: MessageId,
        handle: MessageHandle,
    ) -> RopResult {
        let handle = self.bind(
            context,
            Object::Message(MessageObject {
                mid,
                context,
                handle,
            }),
        )?;
        Ok(RopReply::ok(ReplyBody::Message { handle, mid }))
    }

    fn bind_attachment(
        &mut self,
        context: ContextId,
        attach_num: u32,
        handle: AttachmentHandle,
    ) -> RopResult {
        let handle = self.bind(
            context,
            Object::Attachment(AttachmentObject {
                attach_num,
                context,
                handle,
            }),
        )?;
        Ok(RopReply::ok(ReplyBody::Attachment { handle, attach_num }))
    }
}

#[cfg(test)]
mod test {
    use super::super::test_prelude::*;
    use super::*;

    struct Session {
        setup: Setup,
        processor: RopProcessor,
        root: u32,
    }

    impl Session {
        fn new() -> Self {
            let setup = set_up();
            let mut processor = RopProcessor::new(
                setup.log_prefix.deep_clone(),
                setup.registry.clone(),
            );
            let logon = handle_of(processor.handle_rop(RopRequest::Logon {
                username: "bob".to_owned(),
            }));
            let root = handle_of(processor.handle_rop(RopRequest::AttachStore {
                logon,
                uri: INBOX_URI.to_owned(),
                root: ROOT_FID,
            }));

            Session {
                setup,
                processor,
                root,
            }
        }

        fn rop(&mut self, request: RopRequest) -> RopReply {
            self.processor.handle_rop(request)
        }

        fn ref_count(&self) -> u32 {
            self.setup
                .registry
                .lookup_by_id(self.setup.context)
                .unwrap()
                .ref_count
        }
    }

    fn handle_of(reply: RopReply) -> u32 {
        assert_eq!(MapiStatus::Success, reply.error_code);
        match reply.body {
            ReplyBody::Object { handle }
            | ReplyBody::Table { handle, .. }
            | ReplyBody::Message { handle, .. }
            | ReplyBody::Attachment { handle, .. } => handle,
            body => panic!("Unexpected body: {:?}", body),
        }
    }

    fn subject(s: &str) -> Vec<PropertyValue> {
        vec![PropertyValue::new(
            PropTag::SUBJECT,
            PropValue::Unicode(s.to_owned()),
        )]
    }

    fn row_count(reply: RopReply) -> u32 {
        match reply.body {
            ReplyBody::Table { row_count, .. } => row_count,
            body => panic!("Unexpected body: {:?}", body),
        }
    }

    #[test]
    fn message_lifecycle() {
        let mut session = Session::new();
        let root = session.root;

        let message = handle_of(session.rop(RopRequest::CreateMessage {
            folder: root,
            mid: MessageId(500),
            associated: false,
        }));
        assert_eq!(
            MapiStatus::Success,
            session
                .rop(RopRequest::SetProperties {
                    object: message,
                    values: subject("draft"),
                })
                .error_code
        );

        // Not listed until saved
        assert_eq!(
            0,
            row_count(
                session.rop(RopRequest::GetContentsTable {
                    folder: root,
                    associated: false,
                })
            )
        );
        assert_eq!(
            RopReply::ok(ReplyBody::Empty),
            session.rop(RopRequest::SaveChangesMessage { message })
        );
        assert_eq!(
            1,
            row_count(
                session.rop(RopRequest::GetContentsTable {
                    folder: root,
                    associated: false,
                })
            )
        );
        assert_eq!(
            0,
            row_count(
                session.rop(RopRequest::GetContentsTable {
                    folder: root,
                    associated: true,
                })
            )
        );

        let reopened = session.rop(RopRequest::OpenMessage {
            folder: root,
            mid: MessageId(500),
        });
        assert_matches!(
            ReplyBody::Message {
                mid: MessageId(500),
                ..
            },
            reopened.body
        );

        assert_eq!(
            MapiStatus::Success,
            session
                .rop(RopRequest::DeleteMessages {
                    folder: root,
                    mids: vec![MessageId(500)],
                    hard_delete: true,
                })
                .error_code
        );
        assert_eq!(
            MapiStatus::NotFound,
            session
                .rop(RopRequest::OpenMessage {
                    folder: root,
                    mid: MessageId(500),
                })
                .error_code
        );
    }

    #[test]
    fn recipients_and_submission() {
        let mut session = Session::new();
        let root = session.root;
        let message = handle_of(session.rop(RopRequest::CreateMessage {
            folder: root,
            mid: MessageId(501),
            associated: false,
        }));

        assert_eq!(
            MapiStatus::InvalidParameter,
            session
                .rop(RopRequest::SubmitMessage {
                    message,
                    flags: SubmitFlags::empty(),
                })
                .error_code
        );

        assert_eq!(
            MapiStatus::Success,
            session
                .rop(RopRequest::ModifyRecipients {
                    message,
                    rows: vec![RecipientRow {
                        row_id: 0,
                        recipient_type: RecipientType::To,
                        properties: vec![PropertyValue::new(
                            PropTag::DISPLAY_NAME,
                            PropValue::Unicode("Carol".to_owned()),
                        )],
                    }],
                })
                .error_code
        );
        assert_eq!(
            MapiStatus::Success,
            session
                .rop(RopRequest::SubmitMessage {
                    message,
                    flags: SubmitFlags::empty(),
                })
                .error_code
        );

        // A folder handle is not a message
        assert_eq!(
            MapiStatus::InvalidObject,
            session.rop(RopRequest::SaveChangesMessage { message: root }).error_code
        );
    }

    #[test]
    fn attachments() {
        let mut session = Session::new();
        let root = session.root;
        let message = handle_of(session.rop(RopRequest::CreateMessage {
            folder: root,
            mid: MessageId(502),
            associated: false,
        }));

        let created = session.rop(RopRequest::CreateAttach { message });
        assert_matches!(ReplyBody::Attachment { attach_num: 0, .. }, created.body);
        let attachment = handle_of(created);

        assert_eq!(
            1,
            row_count(session.rop(RopRequest::GetAttachmentTable { message }))
        );

        let embedded =
            session.rop(RopRequest::OpenEmbeddedMessage { attachment });
        let embedded_mid = match embedded.body {
            ReplyBody::Message { mid, .. } => mid,
            ref body => panic!("Unexpected body: {:?}", body),
        };
        // Opening it again yields the same message
        match session.rop(RopRequest::OpenEmbeddedMessage { attachment }).body
        {
            ReplyBody::Message { mid, .. } => assert_eq!(embedded_mid, mid),
            body => panic!("Unexpected body: {:?}", body),
        }

        assert_matches!(
            ReplyBody::Attachment { attach_num: 0, .. },
            session
                .rop(RopRequest::OpenAttach {
                    message,
                    attach_num: 0,
                })
                .body
        );
        assert_eq!(
            MapiStatus::NotFound,
            session
                .rop(RopRequest::OpenAttach {
                    message,
                    attach_num: 7,
                })
                .error_code
        );
    }

    #[test]
    fn objects_hold_context_references() {
        let mut session = Session::new();
        let root = session.root;
        // The set-up context plus the attached root
        assert_eq!(2, session.ref_count());

        let message = handle_of(session.rop(RopRequest::CreateMessage {
            folder: root,
            mid: MessageId(503),
            associated: false,
        }));
        let table =
            handle_of(session.rop(RopRequest::GetAttachmentTable { message }));
        assert_eq!(4, session.ref_count());

        assert_eq!(
            RopReply::ok(ReplyBody::Empty),
            session.rop(RopRequest::Release { object: table })
        );
        assert_eq!(
            RopReply::error(MapiStatus::InvalidObject),
            session.rop(RopRequest::Release { object: table })
        );
        assert_eq!(3, session.ref_count());

        session.processor.close();
        assert_eq!(1, session.ref_count());
    }
}
