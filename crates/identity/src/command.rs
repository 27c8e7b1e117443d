//! Asynchronous command processing.
//!
//! Mutations arrive as [`Command`]s. [`CommandGateway::submit`] queues a
//! command and hands back a [`CommandReceipt`] right away. A dispatcher task
//! routes each command to its application's lane: commands for one
//! application are applied one at a time in submission order, while lanes of
//! different applications run concurrently. A slow signature-set create for
//! one tenant never delays another tenant's commands.
//!
//! Delivery is at-least-once from the caller's point of view, so every
//! handler tolerates duplicates: deleting a deleted set or permission is a
//! no-op, creating a permission twice replaces it, and setting a flag twice
//! writes the same value, and deleting a deleted application reports
//! `existed: false`.
//!
//! # Shutdown
//!
//! [`CommandGateway::shutdown`] stops intake and waits until every lane has
//! drained. Dropping the gateway stops intake too, without waiting.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use tessera_storage::{
    ApplicationId, KeyTimestamp, Permission, PermittableGroupId, UserId,
    auth::{Signature, SignatureSetView},
};
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot},
    task::{JoinError, JoinHandle, JoinSet},
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{IdentityError, Result},
    service::IdentityService,
};

/// A state-changing intent.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Command {
    /// Create a signature set for an application.
    CreateSignatureSet {
        /// Owning application.
        application: ApplicationId,
    },
    /// Delete a signature set, revoking its tokens.
    DeleteSignatureSet {
        /// Owning application.
        application: ApplicationId,
        /// Set to delete.
        timestamp: KeyTimestamp,
    },
    /// Record the signature an application declares for a set.
    SetApplicationSignature {
        /// Owning application.
        application: ApplicationId,
        /// Target set.
        timestamp: KeyTimestamp,
        /// Declared signature.
        signature: Signature,
    },
    /// Create or replace a permission.
    CreatePermission {
        /// Owning application.
        application: ApplicationId,
        /// Permission to store.
        permission: Permission,
    },
    /// Delete a permission and its enablement flags.
    DeletePermission {
        /// Owning application.
        application: ApplicationId,
        /// Permission to delete.
        group: PermittableGroupId,
    },
    /// Set a user's enablement flag for a permission.
    SetUserPermissionEnabled {
        /// Owning application.
        application: ApplicationId,
        /// Target permission.
        group: PermittableGroupId,
        /// Target user.
        user: UserId,
        /// New flag value.
        enabled: bool,
    },
    /// Delete an application with its signature sets, permissions and
    /// enablement flags.
    DeleteApplication {
        /// Application to delete.
        application: ApplicationId,
    },
}

impl Command {
    /// Stable name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateSignatureSet { .. } => "create_signature_set",
            Self::DeleteSignatureSet { .. } => "delete_signature_set",
            Self::SetApplicationSignature { .. } => "set_application_signature",
            Self::CreatePermission { .. } => "create_permission",
            Self::DeletePermission { .. } => "delete_permission",
            Self::SetUserPermissionEnabled { .. } => "set_user_permission_enabled",
            Self::DeleteApplication { .. } => "delete_application",
        }
    }

    /// The application the command targets.
    #[must_use]
    pub fn application(&self) -> &ApplicationId {
        match self {
            Self::CreateSignatureSet { application }
            | Self::DeleteSignatureSet { application, .. }
            | Self::SetApplicationSignature { application, .. }
            | Self::CreatePermission { application, .. }
            | Self::DeletePermission { application, .. }
            | Self::SetUserPermissionEnabled { application, .. }
            | Self::DeleteApplication { application } => application,
        }
    }
}

/// Result of a processed command.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CommandOutcome {
    /// A new signature set was stored.
    SignatureSetCreated(SignatureSetView),
    /// The set is gone; `existed` is `false` for a duplicate delete.
    SignatureSetDeleted {
        /// Whether this command removed it.
        existed: bool,
    },
    /// The application signature was recorded.
    ApplicationSignatureSet,
    /// The permission is stored; `created` is `false` when it was replaced.
    PermissionCreated {
        /// Whether the permission was new.
        created: bool,
    },
    /// The permission is gone; `existed` is `false` for a duplicate delete.
    PermissionDeleted {
        /// Whether this command removed it.
        existed: bool,
    },
    /// The enablement flag was written.
    EnablementSet,
    /// The application is gone; `existed` is `false` for a duplicate delete.
    ApplicationDeleted {
        /// Whether this command removed it.
        existed: bool,
    },
}

/// Identifier assigned to each accepted command, unique per gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandId(u64);

impl CommandId {
    /// Numeric value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

/// Acknowledgment that a command was accepted for processing.
///
/// Dropping a receipt does not cancel the command.
#[derive(Debug)]
#[must_use = "a receipt is the only way to observe the command's outcome"]
pub struct CommandReceipt {
    id: CommandId,
    outcome: oneshot::Receiver<Result<CommandOutcome>>,
}

impl CommandReceipt {
    /// Identifier of the accepted command.
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Waits for the command to be processed.
    ///
    /// # Errors
    ///
    /// Returns the error the command failed with, or
    /// [`IdentityError::Fatal`] if its lane went away without processing
    /// it.
    pub async fn outcome(self) -> Result<CommandOutcome> {
        self.outcome.await.map_err(|_| {
            IdentityError::fatal(format!("{} was dropped before it was processed", self.id))
        })?
    }
}

struct Envelope {
    id: CommandId,
    command: Command,
    reply: oneshot::Sender<Result<CommandOutcome>>,
    permit: OwnedSemaphorePermit,
}

/// Accepts commands and applies them in the background.
pub struct CommandGateway {
    sender: mpsc::Sender<Envelope>,
    in_flight: Arc<Semaphore>,
    capacity: usize,
    next_id: AtomicU64,
    cancel_token: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl CommandGateway {
    /// Starts the dispatcher task. At most
    /// [`command_queue_capacity`](crate::IdentityConfig::command_queue_capacity)
    /// commands are accepted but not yet processed; [`submit`](Self::submit)
    /// waits while that many are outstanding.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[must_use]
    pub fn spawn(service: Arc<IdentityService>) -> Self {
        let capacity = service.config().command_queue_capacity;
        let (sender, receiver) = mpsc::channel(capacity);
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(Self::run(service, receiver, cancel_token.clone()));

        Self {
            sender,
            in_flight: Arc::new(Semaphore::new(capacity)),
            capacity,
            next_id: AtomicU64::new(1),
            cancel_token,
            dispatcher: Mutex::new(Some(handle)),
        }
    }

    /// Queues a command.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Fatal`] once the gateway is shutting down.
    pub async fn submit(&self, command: Command) -> Result<CommandReceipt> {
        let shut_down = || IdentityError::fatal("command gateway is shut down");
        if self.cancel_token.is_cancelled() {
            return Err(shut_down());
        }
        let permit = Arc::clone(&self.in_flight).acquire_owned().await.map_err(|_| shut_down())?;

        let id = CommandId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (reply, outcome) = oneshot::channel();
        tracing::debug!(%id, command = command.name(), application = %command.application(), "command accepted");
        self.sender
            .send(Envelope { id, command, reply, permit })
            .await
            .map_err(|_| shut_down())?;

        Ok(CommandReceipt { id, outcome })
    }

    /// Whether intake has stopped.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Stops intake and waits until every accepted command has been
    /// processed.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        self.in_flight.close();
        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "command dispatcher panicked");
            }
        }
    }

    async fn run(
        service: Arc<IdentityService>,
        mut receiver: mpsc::Receiver<Envelope>,
        token: CancellationToken,
    ) {
        let mut lanes = Lanes::new(service);
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                Some(joined) = lanes.tasks.join_next(), if !lanes.tasks.is_empty() => {
                    Lanes::log_exit(joined);
                },
                envelope = receiver.recv() => match envelope {
                    Some(envelope) => lanes.dispatch(envelope),
                    None => break,
                },
            }
        }

        receiver.close();
        let mut drained = 0_usize;
        while let Some(envelope) = receiver.recv().await {
            lanes.dispatch(envelope);
            drained += 1;
        }
        tracing::info!(drained, lanes = lanes.senders.len(), "command dispatcher shutting down");
        lanes.finish().await;
    }

    #[tracing::instrument(skip_all, fields(id = %envelope.id, command = envelope.command.name()))]
    async fn process(service: &IdentityService, envelope: Envelope) {
        let Envelope { id, command, reply, permit } = envelope;
        let result = Self::apply(service, command).await;
        drop(permit);
        if let Err(err) = &result {
            tracing::warn!(error = %err, kind = ?err.kind(), "command failed");
        }
        if reply.send(result).is_err() {
            tracing::trace!(%id, "receipt dropped before completion");
        }
    }

    async fn apply(service: &IdentityService, command: Command) -> Result<CommandOutcome> {
        match command {
            Command::CreateSignatureSet { application } => service
                .create_signature_set(&application)
                .await
                .map(CommandOutcome::SignatureSetCreated),
            Command::DeleteSignatureSet { application, timestamp } => service
                .delete_signature_set(&application, timestamp)
                .await
                .map(|existed| CommandOutcome::SignatureSetDeleted { existed }),
            Command::SetApplicationSignature { application, timestamp, signature } => {
                service.set_application_signature(&application, timestamp, signature).await?;
                Ok(CommandOutcome::ApplicationSignatureSet)
            },
            Command::CreatePermission { application, permission } => service
                .create_permission(&application, permission)
                .await
                .map(|created| CommandOutcome::PermissionCreated { created }),
            Command::DeletePermission { application, group } => service
                .delete_permission(&application, &group)
                .await
                .map(|existed| CommandOutcome::PermissionDeleted { existed }),
            Command::SetUserPermissionEnabled { application, group, user, enabled } => {
                service.set_user_permission_enabled(&application, &group, &user, enabled).await?;
                Ok(CommandOutcome::EnablementSet)
            },
            Command::DeleteApplication { application } => service
                .delete_application(&application)
                .await
                .map(|existed| CommandOutcome::ApplicationDeleted { existed }),
        }
    }
}

/// One serial worker per application, created on its first command.
struct Lanes {
    service: Arc<IdentityService>,
    senders: HashMap<ApplicationId, mpsc::UnboundedSender<Envelope>>,
    tasks: JoinSet<()>,
}

impl Lanes {
    fn new(service: Arc<IdentityService>) -> Self {
        Self { service, senders: HashMap::new(), tasks: JoinSet::new() }
    }

    fn dispatch(&mut self, envelope: Envelope) {
        let application = envelope.command.application().clone();
        let envelope = match self.senders.get(&application) {
            Some(sender) => match sender.send(envelope) {
                Ok(()) => return,
                // The lane's task is gone; start a fresh one.
                Err(mpsc::error::SendError(envelope)) => envelope,
            },
            None => envelope,
        };

        tracing::debug!(%application, "starting command lane");
        let (sender, receiver) = mpsc::unbounded_channel();
        self.tasks.spawn(Self::lane(Arc::clone(&self.service), envelope, receiver));
        self.senders.insert(application, sender);
    }

    async fn lane(
        service: Arc<IdentityService>,
        first: Envelope,
        mut receiver: mpsc::UnboundedReceiver<Envelope>,
    ) {
        CommandGateway::process(&service, first).await;
        while let Some(envelope) = receiver.recv().await {
            CommandGateway::process(&service, envelope).await;
        }
    }

    fn log_exit(joined: std::result::Result<(), JoinError>) {
        if let Err(err) = joined {
            tracing::warn!(error = %err, "command lane panicked");
        }
    }

    async fn finish(mut self) {
        self.senders.clear();
        while let Some(joined) = self.tasks.join_next().await {
            Self::log_exit(joined);
        }
    }
}

impl Drop for CommandGateway {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        self.in_flight.close();
    }
}

impl fmt::Debug for CommandGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandGateway")
            .field("in_flight", &(self.capacity - self.in_flight.available_permits()))
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use tessera_storage::{
        MemoryUserDirectory,
        auth::audit::NoopAuditLogger,
        testutil::{app_id, group_id, make_permission, user_id},
    };

    use super::*;
    use crate::{ErrorKind, IdentityConfig};

    async fn gateway() -> (Arc<IdentityService>, CommandGateway) {
        let users = MemoryUserDirectory::new();
        users.register_user(user_id("alice"));
        let service = IdentityService::builder()
            .config(
                IdentityConfig::builder()
                    .identity_application("identity-v1")
                    .command_queue_capacity(4)
                    .build(),
            )
            .users(Arc::new(users))
            .audit_logger(Arc::new(NoopAuditLogger))
            .build()
            .unwrap();
        service.register_application(&app_id("office")).await.unwrap();
        let service = Arc::new(service);
        let gateway = CommandGateway::spawn(Arc::clone(&service));
        (service, gateway)
    }

    #[tokio::test]
    async fn test_receipts_report_outcomes() {
        let (service, gateway) = gateway().await;
        let office = app_id("office");

        let receipt = gateway
            .submit(Command::CreateSignatureSet { application: office.clone() })
            .await
            .unwrap();
        let CommandOutcome::SignatureSetCreated(view) = receipt.outcome().await.unwrap() else {
            panic!("unexpected outcome");
        };
        assert_eq!(service.get_all_signature_sets(&office).await.unwrap(), vec![view.timestamp]);
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_increasing() {
        let (_service, gateway) = gateway().await;
        let a = gateway
            .submit(Command::CreateSignatureSet { application: app_id("office") })
            .await
            .unwrap();
        let b = gateway
            .submit(Command::DeletePermission {
                application: app_id("office"),
                group: group_id("documents"),
            })
            .await
            .unwrap();
        assert!(a.id() < b.id());
        assert_eq!(a.id().to_string(), format!("cmd-{}", a.id().get()));
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_safe() {
        let (service, gateway) = gateway().await;
        let office = app_id("office");
        let view = service.create_signature_set(&office).await.unwrap();
        let delete = Command::DeleteSignatureSet { application: office.clone(), timestamp: view.timestamp };
        let create = Command::CreatePermission {
            application: office.clone(),
            permission: make_permission("documents", &[]),
        };

        let first = gateway.submit(delete.clone()).await.unwrap();
        let second = gateway.submit(delete).await.unwrap();
        assert_eq!(first.outcome().await.unwrap(), CommandOutcome::SignatureSetDeleted { existed: true });
        assert_eq!(second.outcome().await.unwrap(), CommandOutcome::SignatureSetDeleted { existed: false });

        let first = gateway.submit(create.clone()).await.unwrap();
        let second = gateway.submit(create).await.unwrap();
        assert_eq!(first.outcome().await.unwrap(), CommandOutcome::PermissionCreated { created: true });
        assert_eq!(second.outcome().await.unwrap(), CommandOutcome::PermissionCreated { created: false });
    }

    #[tokio::test]
    async fn test_failed_command_reports_error() {
        let (_service, gateway) = gateway().await;
        let receipt = gateway
            .submit(Command::SetUserPermissionEnabled {
                application: app_id("office"),
                group: group_id("documents"),
                user: user_id("alice"),
                enabled: true,
            })
            .await
            .unwrap();
        let err = receipt.outcome().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_application_cascades_and_is_idempotent() {
        let (service, gateway) = gateway().await;
        let office = app_id("office");
        service.create_signature_set(&office).await.unwrap();
        service.create_permission(&office, make_permission("documents", &[])).await.unwrap();

        let delete = Command::DeleteApplication { application: office.clone() };
        assert_eq!(delete.name(), "delete_application");
        assert_eq!(delete.application(), &office);

        let first = gateway.submit(delete.clone()).await.unwrap();
        let second = gateway.submit(delete).await.unwrap();
        assert_eq!(first.outcome().await.unwrap(), CommandOutcome::ApplicationDeleted { existed: true });
        assert_eq!(second.outcome().await.unwrap(), CommandOutcome::ApplicationDeleted { existed: false });

        assert!(service.get_all_signature_sets(&office).await.unwrap_err().is_not_found());
        let late = gateway
            .submit(Command::CreatePermission {
                application: office,
                permission: make_permission("documents", &[]),
            })
            .await
            .unwrap();
        assert_eq!(late.outcome().await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_same_application_commands_apply_in_order() {
        let (service, gateway) = gateway().await;
        let office = app_id("office");
        let documents = group_id("documents");

        let create = gateway
            .submit(Command::CreatePermission {
                application: office.clone(),
                permission: make_permission("documents", &[]),
            })
            .await
            .unwrap();
        let enable = gateway
            .submit(Command::SetUserPermissionEnabled {
                application: office.clone(),
                group: documents.clone(),
                user: user_id("alice"),
                enabled: true,
            })
            .await
            .unwrap();
        let delete = gateway
            .submit(Command::DeletePermission { application: office.clone(), group: documents.clone() })
            .await
            .unwrap();

        assert_eq!(create.outcome().await.unwrap(), CommandOutcome::PermissionCreated { created: true });
        assert_eq!(enable.outcome().await.unwrap(), CommandOutcome::EnablementSet);
        assert_eq!(delete.outcome().await.unwrap(), CommandOutcome::PermissionDeleted { existed: true });
        assert!(service.get_permission(&office, &documents).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue_then_rejects() {
        let (service, gateway) = gateway().await;
        let office = app_id("office");

        let mut receipts = Vec::new();
        for group in ["a", "b", "c", "d"] {
            let command = Command::CreatePermission {
                application: office.clone(),
                permission: make_permission(group, &[]),
            };
            receipts.push(gateway.submit(command).await.unwrap());
        }
        gateway.shutdown().await;

        for receipt in receipts {
            receipt.outcome().await.unwrap();
        }
        assert_eq!(service.get_all_permissions(&office).await.unwrap().len(), 4);

        assert!(gateway.is_shut_down());
        let err = gateway
            .submit(Command::CreateSignatureSet { application: office })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }
}
