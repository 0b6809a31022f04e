use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mercaderp_auth::Role;
use mercaderp_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Event, UserId};

use crate::permissions::{can_create, can_edit};
use crate::workflow::{ActionId, actions_for_status, can_user_perform_action, is_transition_allowed};
use crate::{EntryStatus, EntryType};

/// Inventory entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryEntryId(pub AggregateId);

impl InventoryEntryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InventoryEntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Who is issuing a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

/// One stock line of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryLine {
    pub line_no: u32,
    pub sku: String,
    /// Units moved; negative only for adjustments.
    pub quantity: i64,
    /// Cost per unit in smallest currency unit (e.g., cents).
    pub unit_cost: u64,
}

/// Net stock change for one SKU once an entry completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub sku: String,
    pub delta: i64,
}

/// Aggregate root: InventoryEntry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    id: InventoryEntryId,
    entry_number: String,
    entry_type: EntryType,
    status: EntryStatus,
    owner: Option<UserId>,
    lines: Vec<EntryLine>,
    total: i64,
    version: u64,
    created: bool,
}

impl InventoryEntry {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InventoryEntryId) -> Self {
        Self {
            id,
            entry_number: String::new(),
            entry_type: EntryType::Production,
            status: EntryStatus::Draft,
            owner: None,
            lines: Vec::new(),
            total: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InventoryEntryId {
        self.id
    }

    pub fn entry_number(&self) -> &str {
        &self.entry_number
    }

    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    pub fn status(&self) -> EntryStatus {
        self.status
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn lines(&self) -> &[EntryLine] {
        &self.lines
    }

    /// Signed monetary total in smallest currency unit.
    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner == Some(user_id)
    }
}

impl AggregateRoot for InventoryEntry {
    type Id = InventoryEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateEntry. New entries always start in `draft`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEntry {
    pub entry_id: InventoryEntryId,
    pub entry_number: String,
    pub entry_type: EntryType,
    pub actor: Actor,
    pub lines: Vec<EntryLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReplaceItems. Only valid while the entry is a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceItems {
    pub entry_id: InventoryEntryId,
    pub actor: Actor,
    pub lines: Vec<EntryLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PerformAction (submit, approve, complete, cancel, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformAction {
    pub entry_id: InventoryEntryId,
    pub actor: Actor,
    pub action: ActionId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryCommand {
    CreateEntry(CreateEntry),
    ReplaceItems(ReplaceItems),
    PerformAction(PerformAction),
}

/// Event: EntryCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryCreated {
    pub entry_id: InventoryEntryId,
    pub entry_number: String,
    pub entry_type: EntryType,
    pub owner: UserId,
    pub lines: Vec<EntryLine>,
    pub total: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemsReplaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsReplaced {
    pub entry_id: InventoryEntryId,
    pub lines: Vec<EntryLine>,
    pub total: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub entry_id: InventoryEntryId,
    pub from: EntryStatus,
    pub to: EntryStatus,
    pub action: ActionId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockCommitted. Emitted once, when an entry completes; the stock
/// projection applies these deltas to on-hand quantities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCommitted {
    pub entry_id: InventoryEntryId,
    pub entry_type: EntryType,
    pub movements: Vec<StockMovement>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryEvent {
    EntryCreated(EntryCreated),
    ItemsReplaced(ItemsReplaced),
    StatusChanged(StatusChanged),
    StockCommitted(StockCommitted),
}

impl Event for EntryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            EntryEvent::EntryCreated(_) => "inventory.entry.created",
            EntryEvent::ItemsReplaced(_) => "inventory.entry.items_replaced",
            EntryEvent::StatusChanged(_) => "inventory.entry.status_changed",
            EntryEvent::StockCommitted(_) => "inventory.entry.stock_committed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EntryEvent::EntryCreated(e) => e.occurred_at,
            EntryEvent::ItemsReplaced(e) => e.occurred_at,
            EntryEvent::StatusChanged(e) => e.occurred_at,
            EntryEvent::StockCommitted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryEntry {
    type Command = EntryCommand;
    type Event = EntryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            EntryEvent::EntryCreated(e) => {
                self.id = e.entry_id;
                self.entry_number = e.entry_number.clone();
                self.entry_type = e.entry_type;
                self.owner = Some(e.owner);
                self.lines = e.lines.clone();
                self.total = e.total;
                self.status = EntryStatus::Draft;
                self.created = true;
            }
            EntryEvent::ItemsReplaced(e) => {
                self.lines = e.lines.clone();
                self.total = e.total;
            }
            EntryEvent::StatusChanged(e) => {
                self.status = e.to;
            }
            EntryEvent::StockCommitted(_) => {}
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            EntryCommand::CreateEntry(cmd) => self.handle_create(cmd),
            EntryCommand::ReplaceItems(cmd) => self.handle_replace_items(cmd),
            EntryCommand::PerformAction(cmd) => self.handle_action(cmd),
        }
    }
}

impl InventoryEntry {
    fn ensure_entry_id(&self, entry_id: InventoryEntryId) -> Result<(), DomainError> {
        if self.id != entry_id {
            return Err(DomainError::invariant("entry_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateEntry) -> Result<Vec<EntryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("entry already exists"));
        }
        if !can_create(&cmd.actor.role) {
            return Err(DomainError::unauthorized(format!(
                "role '{}' may not create inventory entries",
                cmd.actor.role
            )));
        }
        if cmd.entry_number.trim().is_empty() {
            return Err(DomainError::validation("entry_number cannot be empty"));
        }
        let total = validate_lines(cmd.entry_type, &cmd.lines)?;

        Ok(vec![EntryEvent::EntryCreated(EntryCreated {
            entry_id: cmd.entry_id,
            entry_number: cmd.entry_number.trim().to_string(),
            entry_type: cmd.entry_type,
            owner: cmd.actor.user_id,
            lines: cmd.lines.clone(),
            total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_replace_items(&self, cmd: &ReplaceItems) -> Result<Vec<EntryEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_entry_id(cmd.entry_id)?;

        if self.status != EntryStatus::Draft {
            return Err(DomainError::invariant(format!(
                "items are immutable once the entry is {}",
                self.status
            )));
        }
        let is_owner = self.is_owned_by(cmd.actor.user_id);
        if !can_edit(&cmd.actor.role, self.status, is_owner) {
            return Err(DomainError::unauthorized(format!(
                "role '{}' may not edit this entry",
                cmd.actor.role
            )));
        }
        let total = validate_lines(self.entry_type, &cmd.lines)?;

        Ok(vec![EntryEvent::ItemsReplaced(ItemsReplaced {
            entry_id: cmd.entry_id,
            lines: cmd.lines.clone(),
            total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_action(&self, cmd: &PerformAction) -> Result<Vec<EntryEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_entry_id(cmd.entry_id)?;

        if !is_transition_allowed(self.status, cmd.action.target()) {
            return Err(DomainError::invalid_transition(
                self.status,
                cmd.action.target(),
            ));
        }
        let Some(action) = actions_for_status(self.status)
            .iter()
            .find(|action| action.id == cmd.action)
        else {
            return Err(DomainError::validation(format!(
                "action '{}' is not offered for a {} entry",
                cmd.action, self.status
            )));
        };

        let is_owner = self.is_owned_by(cmd.actor.user_id);
        if !can_user_perform_action(cmd.action, self.status, &cmd.actor.role, is_owner) {
            return Err(DomainError::unauthorized(format!(
                "role '{}' may not {} this entry",
                cmd.actor.role, cmd.action
            )));
        }

        let mut events = vec![EntryEvent::StatusChanged(StatusChanged {
            entry_id: cmd.entry_id,
            from: self.status,
            to: action.target,
            action: action.id,
            actor: cmd.actor.user_id,
            occurred_at: cmd.occurred_at,
        })];

        if action.target == EntryStatus::Completed {
            events.push(EntryEvent::StockCommitted(StockCommitted {
                entry_id: cmd.entry_id,
                entry_type: self.entry_type,
                movements: self.stock_movements(),
                occurred_at: cmd.occurred_at,
            }));
        }

        tracing::debug!(
            entry = %self.entry_number,
            from = %self.status,
            to = %action.target,
            "inventory entry transition accepted"
        );

        Ok(events)
    }

    /// Net delta per SKU, in first-seen order.
    fn stock_movements(&self) -> Vec<StockMovement> {
        let mut movements: Vec<StockMovement> = Vec::new();
        for line in &self.lines {
            match movements.iter_mut().find(|m| m.sku == line.sku) {
                Some(existing) => existing.delta += line.quantity,
                None => movements.push(StockMovement {
                    sku: line.sku.clone(),
                    delta: line.quantity,
                }),
            }
        }
        movements
    }
}

fn validate_lines(entry_type: EntryType, lines: &[EntryLine]) -> Result<i64, DomainError> {
    if lines.is_empty() {
        return Err(DomainError::validation("an entry needs at least one line"));
    }

    let mut total: i64 = 0;
    let mut per_sku: HashMap<&str, i64> = HashMap::new();
    for line in lines {
        if line.sku.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "line {} has an empty sku",
                line.line_no
            )));
        }
        if line.quantity == 0 {
            return Err(DomainError::validation(format!(
                "line {} quantity cannot be zero",
                line.line_no
            )));
        }
        if line.quantity < 0 && !entry_type.allows_negative_quantities() {
            return Err(DomainError::validation(format!(
                "line {} quantity must be positive for a {} entry",
                line.line_no, entry_type
            )));
        }
        let line_total = i64::try_from(line.unit_cost)
            .ok()
            .and_then(|cost| cost.checked_mul(line.quantity))
            .ok_or_else(|| DomainError::invariant("entry line amount overflow"))?;
        total = total
            .checked_add(line_total)
            .ok_or_else(|| DomainError::invariant("entry total overflow"))?;
        let net = per_sku.entry(line.sku.as_str()).or_insert(0);
        *net = net.checked_add(line.quantity).ok_or_else(|| {
            DomainError::invariant(format!("net quantity overflow for sku {}", line.sku))
        })?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_entry_id() -> InventoryEntryId {
        InventoryEntryId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn actor(role: Role) -> Actor {
        Actor {
            user_id: UserId::new(),
            role,
        }
    }

    fn line(line_no: u32, sku: &str, quantity: i64, unit_cost: u64) -> EntryLine {
        EntryLine {
            line_no,
            sku: sku.to_string(),
            quantity,
            unit_cost,
        }
    }

    fn run(entry: &mut InventoryEntry, command: EntryCommand) -> Result<Vec<EntryEvent>, DomainError> {
        let events = entry.handle(&command)?;
        for event in &events {
            entry.apply(event);
        }
        Ok(events)
    }

    fn draft(owner: &Actor, entry_type: EntryType, lines: Vec<EntryLine>) -> InventoryEntry {
        let entry_id = test_entry_id();
        let mut entry = InventoryEntry::empty(entry_id);
        run(
            &mut entry,
            EntryCommand::CreateEntry(CreateEntry {
                entry_id,
                entry_number: "ENT-0001".to_string(),
                entry_type,
                actor: owner.clone(),
                lines,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        entry
    }

    fn act(entry: &mut InventoryEntry, who: &Actor, action: ActionId) -> Result<Vec<EntryEvent>, DomainError> {
        let entry_id = entry.id_typed();
        run(
            entry,
            EntryCommand::PerformAction(PerformAction {
                entry_id,
                actor: who.clone(),
                action,
                occurred_at: test_time(),
            }),
        )
    }

    #[test]
    fn create_starts_in_draft_with_total() {
        let owner = actor(Role::OPERARIO);
        let entry = draft(
            &owner,
            EntryType::Production,
            vec![line(1, "SKU-A", 10, 250), line(2, "SKU-B", 4, 100)],
        );
        assert_eq!(entry.status(), EntryStatus::Draft);
        assert_eq!(entry.total(), 2_900);
        assert!(entry.is_owned_by(owner.user_id));
        assert_eq!(entry.version(), 1);
    }

    #[test]
    fn negative_quantities_only_for_adjustments() {
        let owner = actor(Role::SUPERVISOR);
        let entry_id = test_entry_id();
        let entry = InventoryEntry::empty(entry_id);
        let err = entry
            .handle(&EntryCommand::CreateEntry(CreateEntry {
                entry_id,
                entry_number: "ENT-0002".to_string(),
                entry_type: EntryType::Return,
                actor: owner.clone(),
                lines: vec![line(1, "SKU-A", -3, 100)],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let adjusted = draft(&owner, EntryType::Adjustment, vec![line(1, "SKU-A", -3, 100)]);
        assert_eq!(adjusted.total(), -300);
    }

    #[test]
    fn full_lifecycle_commits_stock_on_complete() {
        let owner = actor(Role::OPERARIO);
        let supervisor = actor(Role::SUPERVISOR);
        let mut entry = draft(
            &owner,
            EntryType::Production,
            vec![line(1, "SKU-A", 10, 250), line(2, "SKU-A", 5, 250), line(3, "SKU-B", 1, 10)],
        );

        act(&mut entry, &owner, ActionId::Submit).unwrap();
        assert_eq!(entry.status(), EntryStatus::Pending);

        act(&mut entry, &supervisor, ActionId::Approve).unwrap();
        assert_eq!(entry.status(), EntryStatus::Approved);

        let events = act(&mut entry, &supervisor, ActionId::Complete).unwrap();
        assert_eq!(entry.status(), EntryStatus::Completed);
        assert_eq!(events.len(), 2);
        match &events[1] {
            EntryEvent::StockCommitted(e) => {
                assert_eq!(
                    e.movements,
                    vec![
                        StockMovement { sku: "SKU-A".to_string(), delta: 15 },
                        StockMovement { sku: "SKU-B".to_string(), delta: 1 },
                    ]
                );
                assert_eq!(events[1].event_type(), "inventory.entry.stock_committed");
            }
            other => panic!("expected StockCommitted, got {other:?}"),
        }
    }

    #[test]
    fn items_are_immutable_after_submit() {
        let owner = actor(Role::GERENTE);
        let mut entry = draft(&owner, EntryType::Initial, vec![line(1, "SKU-A", 1, 1)]);
        act(&mut entry, &owner, ActionId::Submit).unwrap();

        let err = entry
            .handle(&EntryCommand::ReplaceItems(ReplaceItems {
                entry_id: entry.id_typed(),
                actor: owner.clone(),
                lines: vec![line(1, "SKU-A", 2, 1)],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("immutable") => {}
            other => panic!("expected immutability violation, got {other:?}"),
        }
    }

    #[test]
    fn operario_cannot_edit_someone_elses_draft() {
        let owner = actor(Role::OPERARIO);
        let other = actor(Role::OPERARIO);
        let entry = draft(&owner, EntryType::Production, vec![line(1, "SKU-A", 1, 1)]);

        let err = entry
            .handle(&EntryCommand::ReplaceItems(ReplaceItems {
                entry_id: entry.id_typed(),
                actor: other,
                lines: vec![line(1, "SKU-A", 2, 1)],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[test]
    fn operario_cannot_approve_directly() {
        let owner = actor(Role::OPERARIO);
        let mut entry = draft(&owner, EntryType::Production, vec![line(1, "SKU-A", 1, 1)]);
        let err = act(&mut entry, &owner, ActionId::ApproveDirect).unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
        assert_eq!(entry.status(), EntryStatus::Draft);
    }

    #[test]
    fn terminal_entries_reject_every_action() {
        let admin = actor(Role::ADMIN);
        let mut entry = draft(&admin, EntryType::Production, vec![line(1, "SKU-A", 1, 1)]);
        act(&mut entry, &admin, ActionId::Cancel).unwrap();
        assert_eq!(entry.status(), EntryStatus::Cancelled);

        for action in [
            ActionId::Submit,
            ActionId::ApproveDirect,
            ActionId::Approve,
            ActionId::Complete,
            ActionId::Cancel,
        ] {
            let err = act(&mut entry, &admin, action).unwrap_err();
            assert!(matches!(err, DomainError::InvalidTransition { .. }));
        }
        assert_eq!(entry.status(), EntryStatus::Cancelled);
    }

    #[test]
    fn actions_outside_the_status_list_are_rejected() {
        let admin = actor(Role::ADMIN);
        let mut entry = draft(&admin, EntryType::Production, vec![line(1, "SKU-A", 1, 1)]);
        let err = act(&mut entry, &admin, ActionId::Complete).unwrap_err();
        assert_eq!(err, DomainError::invalid_transition("draft", "completed"));

        act(&mut entry, &admin, ActionId::Submit).unwrap();
        let err = act(&mut entry, &admin, ActionId::ApproveDirect).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn unknown_role_cannot_create() {
        let entry_id = test_entry_id();
        let entry = InventoryEntry::empty(entry_id);
        let err = entry
            .handle(&EntryCommand::CreateEntry(CreateEntry {
                entry_id,
                entry_number: "ENT-9".to_string(),
                entry_type: EntryType::Production,
                actor: actor(Role::new("contractor")),
                lines: vec![line(1, "SKU-A", 1, 1)],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[test]
    fn free_lines_cannot_overflow_the_net_stock_movement() {
        let entry_id = test_entry_id();
        let err = InventoryEntry::empty(entry_id)
            .handle(&EntryCommand::CreateEntry(CreateEntry {
                entry_id,
                entry_number: "ENT-10".to_string(),
                entry_type: EntryType::Initial,
                actor: actor(Role::ADMIN),
                lines: vec![line(1, "SKU-A", i64::MAX, 0), line(2, "SKU-A", 1, 0)],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
