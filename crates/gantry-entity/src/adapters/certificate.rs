//! TLS kinds: certificates, CA certificates, SNIs and data plane certificates

use serde_json::{json, Value};

use gantry_common::crd::{
    ControlPlaneRef, GantryCACertificate, GantryCertificate, GantryDataPlaneCertificate, GantrySni,
};
use gantry_remote::EntityKind;

use crate::adapter::{compact, ManagedEntity, ParentRef, ParentRole, ResolvedParents};

impl ManagedEntity for GantryCertificate {
    const REMOTE_KIND: EntityKind = EntityKind::Certificate;

    impl_entity_basics!(tags);

    fn control_plane_ref(&self) -> Option<&ControlPlaneRef> {
        Some(&self.spec.control_plane_ref)
    }

    fn build_payload(&self, _parents: &ResolvedParents) -> gantry_common::Result<Value> {
        Ok(compact(json!({
            "cert": self.spec.cert,
            "key": self.spec.key,
            "cert_alt": self.spec.cert_alt,
            "key_alt": self.spec.key_alt,
        })))
    }
}

impl ManagedEntity for GantryCACertificate {
    const REMOTE_KIND: EntityKind = EntityKind::CaCertificate;

    impl_entity_basics!(tags);

    fn control_plane_ref(&self) -> Option<&ControlPlaneRef> {
        Some(&self.spec.control_plane_ref)
    }

    fn build_payload(&self, _parents: &ResolvedParents) -> gantry_common::Result<Value> {
        Ok(compact(json!({
            "cert": self.spec.cert,
            "cert_digest": self.spec.cert_digest,
        })))
    }
}

impl ManagedEntity for GantrySni {
    const REMOTE_KIND: EntityKind = EntityKind::Sni;
    const PARENT_ROLES: &'static [ParentRole] = &[ParentRole::Certificate];

    impl_entity_basics!(tags);

    fn parent_refs(&self) -> Vec<ParentRef> {
        vec![ParentRef::inheriting(
            ParentRole::Certificate,
            &self.spec.certificate_ref.name,
        )]
    }

    fn build_payload(&self, _parents: &ResolvedParents) -> gantry_common::Result<Value> {
        Ok(json!({ "name": self.spec.name }))
    }
}

impl ManagedEntity for GantryDataPlaneCertificate {
    const REMOTE_KIND: EntityKind = EntityKind::DataPlaneCertificate;

    impl_entity_basics!();

    fn control_plane_ref(&self) -> Option<&ControlPlaneRef> {
        Some(&self.spec.control_plane_ref)
    }

    fn build_payload(&self, _parents: &ResolvedParents) -> gantry_common::Result<Value> {
        Ok(json!({ "cert": self.spec.cert }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_common::crd::GantryDataPlaneCertificateSpec;

    #[test]
    fn data_plane_certificate_has_no_tags() {
        let cert = GantryDataPlaneCertificate::new(
            "dp",
            GantryDataPlaneCertificateSpec {
                control_plane_ref: ControlPlaneRef::named("prod"),
                cert: "-----BEGIN CERTIFICATE-----".to_string(),
                adopt: None,
            },
        );
        assert!(cert.user_tags().is_empty());
        assert_eq!(
            cert.build_payload(&ResolvedParents::default()).unwrap(),
            json!({ "cert": "-----BEGIN CERTIFICATE-----" })
        );
    }
}
