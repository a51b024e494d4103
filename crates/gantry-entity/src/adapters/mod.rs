//! [`ManagedEntity`](crate::ManagedEntity) implementations for every remote-backed kind
//!
//! Each adapter only knows its own spec: which parents it names and how
//! its fields map onto the remote payload.

/// Status, adoption and tag accessors shared by kinds with the usual spec layout
macro_rules! impl_entity_basics {
    () => {
        fn entity_status(&self) -> Option<&gantry_common::crd::EntityStatus> {
            self.status.as_ref()
        }

        fn set_entity_status(&mut self, status: gantry_common::crd::EntityStatus) {
            self.status = Some(status);
        }

        fn adopt_options(&self) -> Option<&gantry_common::crd::AdoptOptions> {
            self.spec.adopt.as_ref()
        }
    };
    (tags) => {
        impl_entity_basics!();

        fn user_tags(&self) -> &[String] {
            &self.spec.tags
        }
    };
}

mod certificate;
mod consumer;
mod control_plane;
mod key;
mod plugin;
mod service;
mod upstream;

/// Declared remote name, falling back to the object name
pub(crate) fn remote_name<K: kube::Resource>(declared: Option<&String>, obj: &K) -> String {
    use kube::ResourceExt;
    declared.cloned().unwrap_or_else(|| obj.name_any())
}
