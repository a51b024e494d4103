//! Status and finalizer coordination
//!
//! [`transition`] is a pure function from what a pass observed to the next
//! status and what to do with the cleanup finalizer. Dependency and
//! transient problems only touch the reason of an existing Programmed
//! condition; terminal problems set it False.
//!
//! A failed write to an entity whose identity is already known still
//! records that identity, so the next pass updates it instead of creating
//! another one.

use gantry_common::crd::{
    condition_types, reasons, set_condition, Condition, ConditionStatus, EntityStatus, RemoteRef,
};

/// A dependency that kept the pass from reaching the remote
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blocker {
    /// Condition describing the failed reference
    pub condition: &'static str,
    /// Stable reason
    pub reason: &'static str,
    /// Human-readable detail
    pub message: String,
    /// The control plane itself is gone or terminating
    pub control_plane_gone: bool,
}

impl Blocker {
    /// Blocker on one reference condition
    pub fn new(condition: &'static str, reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            condition,
            reason,
            message: message.into(),
            control_plane_gone: false,
        }
    }

    /// Blocker caused by a missing or terminating control plane
    pub fn control_plane_gone(message: impl Into<String>) -> Self {
        Self {
            control_plane_gone: true,
            ..Self::new(
                condition_types::CONTROL_PLANE_REF_VALID,
                reasons::CONTROL_PLANE_MISSING,
                message,
            )
        }
    }
}

/// What one reconcile pass observed
#[derive(Clone, Debug, PartialEq)]
pub enum Observation {
    /// Remote entity exists and matches the spec
    Programmed {
        /// Identity of the remote entity
        remote: RemoteRef,
        /// Identity was taken over through adoption in this pass
        adopted: bool,
    },
    /// A parent or credential is not usable yet
    Blocked(Blocker),
    /// The spec cannot be programmed as written
    InvalidSpec(String),
    /// The control plane does not accept writes from us
    ReadOnly(String),
    /// The control plane the entity lived in is gone
    ParentLost(String),
    /// The adoption target does not exist
    AdoptionTargetMissing(String),
    /// The remote rejected the payload
    Rejected(String),
    /// A create conflict could not be resolved onto our entity
    Unresolved {
        /// `ConflictUnresolved` or `AmbiguousUniquenessTag`
        reason: &'static str,
        /// Human-readable detail
        message: String,
    },
    /// Timeout, rate limit or server error
    Transient(String),
    /// The remote entity is known but writing the declared state failed
    Unsynced {
        /// Identity of the remote entity
        remote: RemoteRef,
        /// Identity was taken over through adoption in this pass
        adopted: bool,
        /// `Rejected` or `Transient`
        failure: Box<Observation>,
    },
}

/// What to do with the cleanup finalizer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinalizerAction {
    /// Leave as is
    Keep,
    /// Make sure it is present
    Ensure,
    /// Remove it; nothing remote is tracked anymore
    Release,
}

/// Next status and finalizer action
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// Status to write (compare before writing)
    pub status: EntityStatus,
    /// Finalizer handling
    pub finalizer: FinalizerAction,
}

/// Compute the next status from the current one and an observation.
///
/// # Arguments
///
/// * `current` - Status the object carries now
/// * `generation` - Spec generation the pass worked from
/// * `required` - Conditions the object reports when programmed
///   (see [`crate::ManagedEntity::required_conditions`])
/// * `observation` - What the pass observed
///
/// # Returns
///
/// The status to write and what to do with the cleanup finalizer. Applying
/// the same observation twice yields the same status.
pub fn transition(
    current: &EntityStatus,
    generation: i64,
    required: &[&'static str],
    observation: &Observation,
) -> Transition {
    let mut status = current.clone();
    status.observed_generation = Some(generation);
    let mut set = |type_: &str, value: ConditionStatus, reason: &str, message: &str| {
        set_condition(
            &mut status.conditions,
            Condition::new(type_, value, reason, message, generation),
        );
    };

    let finalizer = match observation {
        Observation::Programmed { remote, adopted } => {
            let was_adopted = current
                .condition(condition_types::ADOPTED)
                .is_some_and(Condition::is_true);
            for &type_ in required {
                match type_ {
                    condition_types::PROGRAMMED => {
                        set(type_, ConditionStatus::True, reasons::PROGRAMMED, "")
                    }
                    condition_types::ADOPTED if *adopted || was_adopted => set(
                        type_,
                        ConditionStatus::True,
                        reasons::ADOPTED,
                        &format!("adopted remote entity {}", remote.id),
                    ),
                    condition_types::ADOPTED => {}
                    _ => set(type_, ConditionStatus::True, reasons::RESOLVED, ""),
                }
            }
            status.remote = Some(remote.clone());
            FinalizerAction::Ensure
        }
        Observation::Blocked(blocker) => {
            set(
                blocker.condition,
                ConditionStatus::False,
                blocker.reason,
                &blocker.message,
            );
            if blocker.condition != condition_types::RESOLVED_REFS {
                set(
                    condition_types::RESOLVED_REFS,
                    ConditionStatus::False,
                    blocker.reason,
                    &blocker.message,
                );
            }
            soften_programmed(
                &mut status,
                generation,
                blocker.reason,
                &blocker.message,
                ConditionStatus::False,
            );
            FinalizerAction::Keep
        }
        Observation::InvalidSpec(message) => {
            set(
                condition_types::PROGRAMMED,
                ConditionStatus::False,
                reasons::INVALID_SPEC,
                message,
            );
            FinalizerAction::Keep
        }
        Observation::ReadOnly(message) => {
            set(
                condition_types::PROGRAMMED,
                ConditionStatus::False,
                reasons::CONTROL_PLANE_READ_ONLY,
                message,
            );
            FinalizerAction::Keep
        }
        Observation::ParentLost(message) => {
            set(
                condition_types::CONTROL_PLANE_REF_VALID,
                ConditionStatus::False,
                reasons::CONTROL_PLANE_LOST,
                message,
            );
            set(
                condition_types::PROGRAMMED,
                ConditionStatus::False,
                reasons::CONTROL_PLANE_LOST,
                message,
            );
            status.remote = None;
            FinalizerAction::Release
        }
        Observation::AdoptionTargetMissing(id) => {
            let message = format!("remote entity {id} does not exist");
            set(
                condition_types::ADOPTED,
                ConditionStatus::False,
                reasons::ADOPTION_TARGET_NOT_FOUND,
                &message,
            );
            set(
                condition_types::PROGRAMMED,
                ConditionStatus::False,
                reasons::ADOPTION_TARGET_NOT_FOUND,
                &message,
            );
            FinalizerAction::Keep
        }
        Observation::Rejected(message) => {
            set(
                condition_types::PROGRAMMED,
                ConditionStatus::False,
                reasons::REMOTE_REJECTED,
                message,
            );
            FinalizerAction::Keep
        }
        Observation::Unresolved { reason, message } => {
            set(condition_types::PROGRAMMED, ConditionStatus::False, *reason, message);
            FinalizerAction::Keep
        }
        Observation::Transient(message) => {
            soften_programmed(
                &mut status,
                generation,
                reasons::REMOTE_TRANSIENT_ERROR,
                message,
                ConditionStatus::Unknown,
            );
            FinalizerAction::Keep
        }
        Observation::Unsynced {
            remote,
            adopted,
            failure,
        } => return unsynced(current, generation, required, remote, *adopted, failure),
    };

    Transition { status, finalizer }
}

/// Record the identity, then apply the write failure on top of it
fn unsynced(
    current: &EntityStatus,
    generation: i64,
    required: &[&'static str],
    remote: &RemoteRef,
    adopted: bool,
    failure: &Observation,
) -> Transition {
    let mut tracked = current.clone();
    tracked.remote = Some(remote.clone());
    if adopted && required.contains(&condition_types::ADOPTED) {
        set_condition(
            &mut tracked.conditions,
            Condition::new(
                condition_types::ADOPTED,
                ConditionStatus::True,
                reasons::ADOPTED,
                format!("adopted remote entity {}", remote.id),
                generation,
            ),
        );
    }
    Transition {
        finalizer: FinalizerAction::Ensure,
        ..transition(&tracked, generation, required, failure)
    }
}

/// Update only the reason of an existing Programmed condition, or create it
/// with `initial` when absent
fn soften_programmed(
    status: &mut EntityStatus,
    generation: i64,
    reason: &str,
    message: &str,
    initial: ConditionStatus,
) {
    match status
        .conditions
        .iter_mut()
        .find(|c| c.type_ == condition_types::PROGRAMMED)
    {
        Some(existing) => {
            existing.reason = reason.to_string();
            existing.message = message.to_string();
        }
        None => status.conditions.push(Condition::new(
            condition_types::PROGRAMMED,
            initial,
            reason,
            message,
            generation,
        )),
    }
}
