#![allow(dead_code)]

use std::sync::Arc;

use murmur_node::{
    build_key_manager, ingest_ledger, BlobStore, ChannelCodec, ChannelService, ContactService,
    EventDrainer, FsBlobStore, IdentityService, KeyManager, Ledger, MemoryLedger, OpenedChannel,
};
use murmur_shared::handshake::HandshakeMessage;
use murmur_shared::types::ChannelMemberId;
use murmur_store::{lock_db, ChannelMessage, Database, IdentityRecord, SharedDatabase};
use tempfile::TempDir;

/// One party: its own on-disk database and services, sharing the blob store
/// and the ledger with everyone else.
pub struct Node {
    pub db: SharedDatabase,
    pub keys: Arc<dyn KeyManager>,
    pub contacts: ContactService,
    pub channels: ChannelService,
    pub codec: Arc<ChannelCodec>,
    pub drainer: EventDrainer,
    pub identity: IdentityRecord,
    cursor: usize,
    _dir: TempDir,
}

impl Node {
    pub fn new(name: &str, blobs: Arc<dyn BlobStore>, ledger: Arc<dyn Ledger>) -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(&dir.path().join("node.db"))
            .unwrap()
            .into_shared();
        let keys = build_key_manager("database", &db).unwrap();

        let identity = IdentityService::new(db.clone(), keys.clone())
            .create_identity(Some(name.to_string()))
            .unwrap();
        let codec = Arc::new(ChannelCodec::new(db.clone(), keys.clone(), blobs, ledger));

        Self {
            contacts: ContactService::new(db.clone(), keys.clone()),
            channels: ChannelService::new(db.clone(), keys.clone()),
            drainer: EventDrainer::new(db.clone(), codec.clone()),
            codec,
            keys,
            identity,
            db,
            cursor: 0,
            _dir: dir,
        }
    }

    /// Pull new ledger entries into the local event store and drain it.
    pub async fn sync(&mut self, ledger: &MemoryLedger) -> usize {
        self.cursor = ingest_ledger(ledger, &self.db, self.cursor).await.unwrap();
        self.drainer.drain().await.unwrap()
    }

    pub fn messages(&self, member: ChannelMemberId) -> Vec<ChannelMessage> {
        lock_db(&self.db).unwrap().list_channel_messages(member).unwrap()
    }

    pub fn texts(&self, member: ChannelMemberId) -> Vec<String> {
        self.messages(member)
            .into_iter()
            .map(|m| m.message_contents)
            .collect()
    }
}

pub struct World {
    pub ledger: Arc<MemoryLedger>,
    pub blobs: Arc<FsBlobStore>,
    _dir: TempDir,
}

impl World {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(
            FsBlobStore::new(dir.path().join("blobs"), 1024 * 1024)
                .await
                .unwrap(),
        );
        Self {
            ledger: Arc::new(MemoryLedger::new()),
            blobs,
            _dir: dir,
        }
    }

    pub fn node(&self, name: &str) -> Node {
        Node::new(name, self.blobs.clone(), self.ledger.clone())
    }
}

/// Run the full handshake between two nodes, exchanging the messages as
/// copiable codes, and open a channel on both sides. The initiator pins the
/// responder's signing key.
pub fn connect(initiator: &Node, responder: &Node) -> (OpenedChannel, OpenedChannel) {
    let (pending, init) = initiator
        .contacts
        .init_handshake_with(initiator.identity.id, Some(responder.identity.public_signing_key))
        .unwrap();
    let init = HandshakeMessage::decode(&init.encode().unwrap()).unwrap();

    let received = responder
        .contacts
        .accept_handshake(responder.identity.id, &init)
        .unwrap();
    let reply = responder.contacts.reply_handshake(received.id).unwrap();
    let reply = HandshakeMessage::decode(&reply.encode().unwrap()).unwrap();

    initiator
        .contacts
        .accept_handshake(initiator.identity.id, &reply)
        .unwrap();

    (
        initiator.channels.open_channel(pending.id, "general").unwrap(),
        responder.channels.open_channel(received.id, "general").unwrap(),
    )
}
