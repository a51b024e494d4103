//! Parent resolution
//!
//! Before touching the remote, every reference an entity makes must lead
//! to something usable: the control plane (explicit or inherited through a
//! parent chain), the credentials to reach it, each parent's remote id and,
//! for plugin bindings, the plugin definition. Cross-namespace references
//! are only followed when a reference grant permits them.

use tracing::debug;

use gantry_common::crd::{condition_types, reasons, ControlPlaneTarget, NamespacedRef};
use gantry_common::{Error, GrantLookup, GrantRequest};
use gantry_remote::{RemoteAuth, RemoteScope};

use crate::adapter::{
    ManagedEntity, ParentRef, ResolvedParent, ResolvedParents, AUTH_CONFIGURATION_KIND,
    CONTROL_PLANE_KIND, PLUGIN_KIND,
};
use crate::error::ReconcileError;
use crate::parents::ParentLookup;
use crate::status::Blocker;

/// Maximum number of parents followed to find an inherited control plane
pub const MAX_INHERITANCE_DEPTH: usize = 3;

/// Everything needed to talk to the remote on behalf of one entity
#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    /// Credentials for the remote API
    pub auth: RemoteAuth,
    /// Auth configuration the credentials came from, namespace resolved
    pub auth_ref: NamespacedRef,
    /// Where the entity lives remotely
    pub scope: RemoteScope,
    /// Inputs for payload construction
    pub parents: ResolvedParents,
}

/// Result of resolving an entity's references
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// All references are usable
    Resolved(Box<Resolved>),
    /// A reference is not usable yet
    Blocked(Blocker),
    /// The control plane does not accept writes from us
    ReadOnly(String),
    /// A reference is malformed
    Invalid(String),
}

impl From<Blocker> for Resolution {
    fn from(blocker: Blocker) -> Self {
        Self::Blocked(blocker)
    }
}

/// Where the credentials for an entity come from
struct AuthSource {
    target: NamespacedRef,
    from_kind: String,
    from_namespace: String,
    condition: &'static str,
}

/// Control plane facts gathered on the way to the credentials
struct ControlPlaneFacts {
    id: Option<String>,
    org_id: Option<String>,
    auth: AuthSource,
}

fn not_permitted(condition: &'static str, request: &GrantRequest) -> Blocker {
    Blocker::new(
        condition,
        reasons::REFERENCE_NOT_PERMITTED,
        format!(
            "no reference grant in {} permits {} from {} to reference {} {}",
            request.to_namespace,
            request.from_kind,
            request.from_namespace,
            request.to_kind,
            request.to_name
        ),
    )
}

/// Resolves references against a [`ParentLookup`] and a [`GrantLookup`]
pub struct Resolver<'a> {
    lookup: &'a dyn ParentLookup,
    grants: &'a dyn GrantLookup,
}

impl<'a> Resolver<'a> {
    /// Create a resolver
    pub fn new(lookup: &'a dyn ParentLookup, grants: &'a dyn GrantLookup) -> Self {
        Self { lookup, grants }
    }

    /// Resolve every reference `obj` makes
    ///
    /// Lookup failures other than "not found" are returned as errors so the
    /// pass is retried; everything else is folded into the [`Resolution`].
    pub async fn resolve<E: ManagedEntity>(&self, obj: &E) -> Result<Resolution, ReconcileError> {
        let namespace = obj
            .meta()
            .namespace
            .clone()
            .ok_or_else(|| ReconcileError::Validation("object has no namespace".to_string()))?;
        let kind = E::kind(&()).to_string();

        let facts = if E::REMOTE_KIND.is_control_plane_scoped() {
            match self.control_plane(obj, &kind, &namespace).await? {
                Ok(facts) => facts,
                Err(resolution) => return Ok(resolution),
            }
        } else {
            let Some(auth_ref) = obj.auth_ref() else {
                return Ok(Resolution::Invalid("spec.authRef is required".to_string()));
            };
            ControlPlaneFacts {
                id: None,
                org_id: None,
                auth: AuthSource {
                    target: auth_ref.clone(),
                    from_kind: kind.clone(),
                    from_namespace: namespace.clone(),
                    condition: condition_types::AUTH_REF_VALID,
                },
            }
        };

        let (auth, auth_ref) = match self.auth(&facts.auth).await? {
            Ok(found) => found,
            Err(blocker) => return Ok(blocker.into()),
        };

        let mut scope = RemoteScope {
            control_plane_id: facts.id.clone(),
            ..Default::default()
        };
        let mut resolved = Vec::new();
        for parent in obj.parent_refs() {
            match self.parent(&parent, &namespace, facts.id.as_deref()).await? {
                Ok(remote_id) => {
                    if let Some(key) = parent.role.scope_key() {
                        if E::REMOTE_KIND.nested_parent() == Some(key) {
                            scope = scope.with_parent(key, remote_id.clone());
                        }
                    }
                    resolved.push(ResolvedParent {
                        role: parent.role,
                        name: parent.name,
                        remote_id,
                    });
                }
                Err(blocker) => return Ok(blocker.into()),
            }
        }

        let plugin = match obj.plugin_ref() {
            Some(plugin_ref) => match self.plugin(plugin_ref, &kind, &namespace).await? {
                Ok(spec) => Some(spec),
                Err(blocker) => return Ok(blocker.into()),
            },
            None => None,
        };

        Ok(Resolution::Resolved(Box::new(Resolved {
            auth,
            auth_ref,
            scope,
            parents: ResolvedParents {
                control_plane_id: facts.id,
                org_id: facts.org_id,
                parents: resolved,
                plugin,
            },
        })))
    }

    async fn permitted(&self, request: &GrantRequest) -> Result<bool, Error> {
        if !request.is_cross_namespace() {
            return Ok(true);
        }
        self.grants.permits(request).await
    }

    /// Find the control plane, explicitly referenced or inherited
    async fn control_plane<E: ManagedEntity>(
        &self,
        obj: &E,
        kind: &str,
        namespace: &str,
    ) -> Result<Result<ControlPlaneFacts, Resolution>, ReconcileError> {
        let (cp_ref, declared_kind, declared_namespace) = match obj.control_plane_ref() {
            Some(cp_ref) => (cp_ref.clone(), kind.to_string(), namespace.to_string()),
            None => {
                let Some(first) = obj.parent_refs().into_iter().find(|p| p.inherits_control_plane)
                else {
                    return Ok(Err(Resolution::Invalid(
                        "spec.controlPlaneRef is required".to_string(),
                    )));
                };
                match self.inherited_control_plane(first, namespace).await? {
                    Ok(found) => found,
                    Err(blocker) => return Ok(Err(blocker.into())),
                }
            }
        };

        let target = match cp_ref.target() {
            Ok(target) => target,
            Err(e) => return Ok(Err(Resolution::Invalid(e.message()))),
        };

        match target {
            ControlPlaneTarget::NamespacedRef(r) => {
                let cp_namespace = r.resolve_namespace(&declared_namespace).to_string();
                let request = GrantRequest::new(
                    &declared_kind,
                    &declared_namespace,
                    CONTROL_PLANE_KIND,
                    &cp_namespace,
                    &r.name,
                );
                if !self.permitted(&request).await? {
                    return Ok(Err(not_permitted(
                        condition_types::CONTROL_PLANE_REF_VALID,
                        &request,
                    )
                    .into()));
                }
                let state = match self.lookup.control_plane(&cp_namespace, &r.name).await? {
                    Some(state) if !state.deleting => state,
                    Some(_) => {
                        return Ok(Err(Blocker::control_plane_gone(format!(
                            "control plane {cp_namespace}/{} is being deleted",
                            r.name
                        ))
                        .into()))
                    }
                    None => {
                        return Ok(Err(Blocker::control_plane_gone(format!(
                            "control plane {cp_namespace}/{} not found",
                            r.name
                        ))
                        .into()))
                    }
                };
                if state.read_only {
                    return Ok(Err(Resolution::ReadOnly(format!(
                        "control plane {cp_namespace}/{} is managed by an ingress controller",
                        r.name
                    ))));
                }
                let Some(id) = state.remote_id else {
                    return Ok(Err(Blocker::new(
                        condition_types::CONTROL_PLANE_REF_VALID,
                        reasons::CONTROL_PLANE_NOT_PROGRAMMED,
                        format!("control plane {cp_namespace}/{} is not programmed yet", r.name),
                    )
                    .into()));
                };
                Ok(Ok(ControlPlaneFacts {
                    id: Some(id),
                    org_id: state.org_id,
                    auth: AuthSource {
                        target: state.auth_ref,
                        from_kind: CONTROL_PLANE_KIND.to_string(),
                        from_namespace: cp_namespace,
                        condition: condition_types::CONTROL_PLANE_REF_VALID,
                    },
                }))
            }
            ControlPlaneTarget::RemoteId { id, auth_ref } => Ok(Ok(ControlPlaneFacts {
                id: Some(id),
                org_id: None,
                auth: AuthSource {
                    target: auth_ref,
                    from_kind: declared_kind,
                    from_namespace: declared_namespace,
                    condition: condition_types::CONTROL_PLANE_REF_VALID,
                },
            })),
            ControlPlaneTarget::ExternallyManaged { id, .. } => Ok(Err(Resolution::ReadOnly(
                format!("control plane {id} is externally managed"),
            ))),
        }
    }

    /// Walk the inheriting parents until one declares a control plane
    ///
    /// Returns the reference together with the kind and namespace it was
    /// declared in, which is what grants are checked against.
    async fn inherited_control_plane(
        &self,
        first: ParentRef,
        namespace: &str,
    ) -> Result<
        Result<(gantry_common::crd::ControlPlaneRef, String, String), Blocker>,
        ReconcileError,
    > {
        let mut current = first;
        for _ in 0..MAX_INHERITANCE_DEPTH {
            let kind = current.role.kind();
            let Some(state) = self.lookup.parent(current.role, namespace, &current.name).await?
            else {
                return Ok(Err(Blocker::new(
                    current.role.condition_type(),
                    reasons::MISSING_DEPENDENCY,
                    format!("{kind} {} not found", current.name),
                )));
            };
            if let Some(cp_ref) = state.control_plane_ref {
                return Ok(Ok((cp_ref, kind.to_string(), state.namespace)));
            }
            match state.inherits_from {
                Some(next) => {
                    debug!(
                        parent = %current.name,
                        next = %next.name,
                        "following control plane inheritance"
                    );
                    current = next;
                }
                None => {
                    return Ok(Err(Blocker::new(
                        current.role.condition_type(),
                        reasons::MISSING_DEPENDENCY,
                        format!("{kind} {} has no control plane", current.name),
                    )))
                }
            }
        }
        Ok(Err(Blocker::new(
            current.role.condition_type(),
            reasons::MISSING_DEPENDENCY,
            format!("control plane inheritance deeper than {MAX_INHERITANCE_DEPTH} levels"),
        )))
    }

    async fn auth(
        &self,
        source: &AuthSource,
    ) -> Result<Result<(RemoteAuth, NamespacedRef), Blocker>, ReconcileError> {
        let namespace = source.target.resolve_namespace(&source.from_namespace).to_string();
        let name = &source.target.name;
        let request = GrantRequest::new(
            &source.from_kind,
            &source.from_namespace,
            AUTH_CONFIGURATION_KIND,
            &namespace,
            name,
        );
        if !self.permitted(&request).await? {
            return Ok(Err(not_permitted(source.condition, &request)));
        }
        let missing = |detail: String| {
            Blocker::new(source.condition, reasons::AUTH_CONFIGURATION_MISSING, detail)
        };
        match self.lookup.auth(&namespace, name).await {
            Ok(Some(auth)) => Ok(Ok((
                auth,
                NamespacedRef {
                    name: name.clone(),
                    namespace: Some(namespace),
                },
            ))),
            Ok(None) => Ok(Err(missing(format!(
                "auth configuration {namespace}/{name} not found"
            )))),
            Err(e @ Error::Validation { .. }) => Ok(Err(missing(format!(
                "auth configuration {namespace}/{name} is unusable: {}",
                e.message()
            )))),
            Err(e) => Err(e.into()),
        }
    }

    async fn parent(
        &self,
        parent: &ParentRef,
        namespace: &str,
        control_plane_id: Option<&str>,
    ) -> Result<Result<String, Blocker>, ReconcileError> {
        let kind = parent.role.kind();
        let condition = parent.role.condition_type();
        let missing = |detail: String| Blocker::new(condition, reasons::MISSING_DEPENDENCY, detail);

        let state = match self.lookup.parent(parent.role, namespace, &parent.name).await? {
            Some(state) if state.deleting => {
                return Ok(Err(missing(format!("{kind} {} is being deleted", parent.name))))
            }
            Some(state) => state,
            None => return Ok(Err(missing(format!("{kind} {} not found", parent.name)))),
        };
        let Some(remote_id) = state.remote_id else {
            return Ok(Err(missing(format!("{kind} {} is not programmed yet", parent.name))));
        };
        if control_plane_id.is_some() && state.control_plane_id.as_deref() != control_plane_id {
            return Ok(Err(Blocker::new(
                condition,
                reasons::CONTROL_PLANE_MISMATCH,
                format!(
                    "{kind} {} is programmed in control plane {}, not {}",
                    parent.name,
                    state.control_plane_id.as_deref().unwrap_or("<none>"),
                    control_plane_id.unwrap_or_default()
                ),
            )));
        }
        Ok(Ok(remote_id))
    }

    async fn plugin(
        &self,
        plugin_ref: &NamespacedRef,
        kind: &str,
        namespace: &str,
    ) -> Result<Result<gantry_common::crd::GantryPluginSpec, Blocker>, ReconcileError> {
        let plugin_namespace = plugin_ref.resolve_namespace(namespace).to_string();
        let name = &plugin_ref.name;
        let request = GrantRequest::new(kind, namespace, PLUGIN_KIND, &plugin_namespace, name);
        if !self.permitted(&request).await? {
            return Ok(Err(not_permitted(condition_types::PLUGIN_REF_VALID, &request)));
        }
        match self.lookup.plugin(&plugin_namespace, name).await? {
            Some(plugin) if !plugin.deleting => Ok(Ok(plugin.spec)),
            Some(_) => Ok(Err(Blocker::new(
                condition_types::PLUGIN_REF_VALID,
                reasons::MISSING_DEPENDENCY,
                format!("plugin {plugin_namespace}/{name} is being deleted"),
            ))),
            None => Ok(Err(Blocker::new(
                condition_types::PLUGIN_REF_VALID,
                reasons::MISSING_DEPENDENCY,
                format!("plugin {plugin_namespace}/{name} not found"),
            ))),
        }
    }
}
