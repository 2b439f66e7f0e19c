//! The catalogue of NaviCue modules.
//!
//! # Modules
//!
//! - [`catalogue`] -- [`Catalogue`], a validated map of module definitions,
//!   and [`CatalogueError`].
//! - [`builtin`] -- The built-in modules and [`create_catalogue`].
//!
//! Definitions are validated on insert: a module whose stage table,
//! accumulator bindings or demo script is malformed never enters a
//! catalogue.

pub mod builtin;
pub mod catalogue;

// Re-export primary types at crate root.
pub use builtin::create_catalogue;
pub use catalogue::{Catalogue, CatalogueError};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use navicue_core::{LabTimeContext, NavicueConfig};

    use super::*;

    #[test]
    fn duplicate_ids_rejected() {
        let mut catalogue = create_catalogue().unwrap();
        let copy = catalogue.get("still_point").cloned().unwrap();
        let before = catalogue.len();
        let result = catalogue.insert(copy);
        assert!(matches!(result, Err(CatalogueError::DuplicateModule { .. })));
        assert_eq!(catalogue.len(), before);
    }

    #[test]
    fn unknown_id_is_an_error() {
        let catalogue = create_catalogue().unwrap();
        assert!(catalogue.get("no_such_module").is_none());
        assert!(matches!(
            catalogue.require("no_such_module"),
            Err(CatalogueError::UnknownModule { .. })
        ));
    }

    #[test]
    fn invalid_definition_rejected() {
        let mut definition = create_catalogue()
            .unwrap()
            .get("threshold_taps")
            .cloned()
            .unwrap();
        definition.meta.id = "broken".to_owned();
        definition.stages.pop();
        let mut catalogue = Catalogue::new();
        assert!(matches!(
            catalogue.insert(definition),
            Err(CatalogueError::InvalidModule(_))
        ));
        assert!(catalogue.is_empty());
    }

    #[test]
    fn config_modules_merge_into_catalogue() {
        let yaml = r"
modules:
  - meta:
      id: quiet_bell
      title: Quiet Bell
      signature: sacred_ordinary
      mechanism: attention
      kbe: knowing
      form: ritual
      interaction: tap
    stages:
      - { key: arriving, role: ambient, rule: { kind: auto, timing: { production_ms: 1000 } } }
      - { key: ringing, role: interactive, rule: { kind: gated } }
      - { key: resonant, role: resonant, rule: { kind: auto, timing: { production_ms: 2000 } } }
      - { key: afterglow, role: afterglow, rule: { kind: terminal } }
    accumulators:
      - { stage: ringing, rule: { kind: counter, target: 1 } }
    demo_script:
      - { step: wait, ms: 1000 }
      - { step: input, stage: ringing, input: { type: tap, qualifying: true } }
";
        let config = NavicueConfig::parse(yaml).unwrap();
        let mut catalogue = create_catalogue().unwrap();
        catalogue.extend(config.modules).unwrap();
        assert_eq!(catalogue.len(), 7);

        let run = catalogue
            .require("quiet_bell")
            .unwrap()
            .run_script_headless(LabTimeContext::production())
            .unwrap();
        assert!(run.completed);
        assert_eq!(run.elapsed_ms, 3_000);
    }

    #[test]
    fn definitions_serialize_to_json() {
        let catalogue = create_catalogue().unwrap();
        let definition = catalogue.require("breath_anchor").unwrap();
        let json = serde_json::to_value(definition).unwrap();
        assert_eq!(json["meta"]["interaction"], "hold");
        assert_eq!(json["accumulators"][0]["rule"]["kind"], "hold_decay");
    }
}
