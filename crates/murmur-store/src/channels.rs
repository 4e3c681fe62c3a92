//! CRUD operations for [`Channel`] and [`ChannelMember`] records.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};
use zeroize::Zeroizing;

use murmur_shared::types::{ChannelId, ChannelIdentifier, ChannelMemberId, ContactId, IdentityId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Channel, ChannelMember, ChannelMemberParty, ChannelMemberQuery, MemberSide};
use crate::rows::{key_at, not_found, opt_uuid_at, timestamp_at, uuid_at};

const MEMBER_COLUMNS: &str = "id, channel_id, user_id, contact_id, message_chain_key,
     next_channel_identifier, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a channel and its members in one transaction.
    pub fn create_channel_with_members(
        &mut self,
        channel: &Channel,
        members: &[ChannelMember],
    ) -> Result<()> {
        let tx = self.conn_mut().transaction()?;

        tx.execute(
            "INSERT INTO channels (id, name, channel_key, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                channel.id.to_string(),
                channel.name,
                hex::encode(channel.channel_key),
                channel.created_at.to_rfc3339(),
            ],
        )?;

        for member in members {
            if member.channel_id != channel.id {
                return Err(StoreError::InvalidRecord(format!(
                    "member {} belongs to channel {}, not {}",
                    member.id, member.channel_id, channel.id
                )));
            }
            let (user_id, contact_id) = match member.party {
                ChannelMemberParty::User(id) => (Some(id.to_string()), None),
                ChannelMemberParty::Contact(id) => (None, Some(id.to_string())),
            };
            let chain_hex = Zeroizing::new(hex::encode(&*member.message_chain_key));
            tx.execute(
                "INSERT INTO channel_members (id, channel_id, user_id, contact_id,
                     message_chain_key, next_channel_identifier, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    member.id.to_string(),
                    member.channel_id.to_string(),
                    user_id,
                    contact_id,
                    chain_hex.as_str(),
                    member.next_channel_identifier.as_str(),
                    member.created_at.to_rfc3339(),
                    member.updated_at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_channel(&self, id: ChannelId) -> Result<Channel> {
        self.conn()
            .query_row(
                "SELECT id, name, channel_key, created_at
                 FROM channels
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_channel,
            )
            .map_err(not_found)
    }

    pub fn get_channel_member(&self, id: ChannelMemberId) -> Result<ChannelMember> {
        self.conn()
            .query_row(
                &format!("SELECT {MEMBER_COLUMNS} FROM channel_members WHERE id = ?1"),
                params![id.to_string()],
                row_to_member,
            )
            .map_err(not_found)
    }

    /// Members matching every set field of `query`, oldest first.
    pub fn find_channel_members(&self, query: &ChannelMemberQuery) -> Result<Vec<ChannelMember>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(contact_id) = query.contact_id {
            clauses.push("contact_id = ?");
            values.push(Value::Text(contact_id.to_string()));
        }
        if let Some(user_id) = query.user_id {
            clauses.push("user_id = ?");
            values.push(Value::Text(user_id.to_string()));
        }
        if let Some(channel_id) = query.channel_id {
            clauses.push("channel_id = ?");
            values.push(Value::Text(channel_id.to_string()));
        }
        if let Some(ref identifier) = query.next_identifier {
            clauses.push("next_channel_identifier = ?");
            values.push(Value::Text(identifier.as_str().to_string()));
        }
        match query.side {
            Some(MemberSide::User) => clauses.push("user_id IS NOT NULL"),
            Some(MemberSide::Contact) => clauses.push("contact_id IS NOT NULL"),
            None => {}
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MEMBER_COLUMNS} FROM channel_members {where_sql}
             ORDER BY created_at ASC, id ASC"
        ))?;

        let rows = stmt.query_map(params_from_iter(values), row_to_member)?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    /// The contact-side member whose next message carries `identifier`.
    pub fn find_contact_member_by_identifier(
        &self,
        identifier: &ChannelIdentifier,
    ) -> Result<Option<ChannelMember>> {
        let mut members = self.find_channel_members(&ChannelMemberQuery {
            next_identifier: Some(identifier.clone()),
            side: Some(MemberSide::Contact),
            ..Default::default()
        })?;
        if members.len() > 1 {
            tracing::warn!(
                identifier = %identifier,
                matches = members.len(),
                "channel identifier matches several contact members"
            );
        }
        Ok(if members.is_empty() {
            None
        } else {
            Some(members.swap_remove(0))
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Channel`].
fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: ChannelId(uuid_at(row, 0)?),
        name: row.get(1)?,
        channel_key: key_at(row, 2)?,
        created_at: timestamp_at(row, 3)?,
    })
}

/// Map a `rusqlite::Row` to a [`ChannelMember`], enforcing user xor contact.
fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelMember> {
    let party = match (opt_uuid_at(row, 2)?, opt_uuid_at(row, 3)?) {
        (Some(user), None) => ChannelMemberParty::User(IdentityId(user)),
        (None, Some(contact)) => ChannelMemberParty::Contact(ContactId(contact)),
        _ => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                "channel member must reference exactly one of user or contact".into(),
            ))
        }
    };

    let identifier: String = row.get(5)?;

    Ok(ChannelMember {
        id: ChannelMemberId(uuid_at(row, 0)?),
        channel_id: ChannelId(uuid_at(row, 1)?),
        party,
        message_chain_key: Zeroizing::new(key_at(row, 4)?),
        next_channel_identifier: ChannelIdentifier(identifier),
        created_at: timestamp_at(row, 6)?,
        updated_at: timestamp_at(row, 7)?,
    })
}
