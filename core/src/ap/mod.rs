//! Collection of application kinds that can be read from the card

pub mod calypso;
pub mod cepas;
pub mod china;
pub mod emv;
pub mod ksx6924;

use crate::feedback::Feedback;
use crate::iso7816::{Application, MutableCapsule, Protocol, Result};

/// Reads an application after its name was selected, starting from the capsule holding the
/// name and the FCI. Returns no application if the card turned out not to be of the kind.
pub type DumpFn = fn(&Protocol, MutableCapsule, &dyn Feedback) -> Result<Vec<Application>>;

/// How to recognise and read one kind of application.
#[derive(Clone, Copy)]
pub struct ApplicationFactory {
    /// Identifiers of the kinds of application this factory produces, including former ones.
    pub type_names: &'static [&'static str],

    /// Names selected to find the application, in order.
    pub application_names: &'static [&'static [u8]],

    /// Stops trying the remaining names once one of them was read.
    pub stop_after_first_app: bool,

    pub dump: DumpFn,
}

impl ApplicationFactory {
    pub fn handles(&self, type_name: &str) -> bool {
        self.type_names.contains(&type_name)
    }
}

macro_rules! factory {
    ($types: expr, $names: expr, $stop: expr) => {
        /// Registration of the kind in the card scan.
        pub const FACTORY: crate::ap::ApplicationFactory = crate::ap::ApplicationFactory {
            type_names: $types,
            application_names: $names,
            stop_after_first_app: $stop,
            dump,
        };
    };
}

pub(crate) use factory;

/// Every known kind, in the order they are tried.
pub fn default_factories() -> Vec<ApplicationFactory> {
    vec![
        calypso::FACTORY,
        ksx6924::FACTORY,
        china::FACTORY,
        emv::FACTORY,
    ]
}

/// Finds the factory producing applications of the kind.
pub fn factory_for_type(type_name: &str) -> Option<ApplicationFactory> {
    default_factories()
        .into_iter()
        .find(|factory| factory.handles(type_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_factories() {
        let names: Vec<_> = default_factories()
            .iter()
            .map(|factory| factory.type_names[0])
            .collect();

        assert_eq!(vec!["calypso", "ksx6924", "china", "emv-anchor"], names);
    }

    #[test]
    fn test_factory_for_type() {
        assert_eq!(
            Some(&["ksx6924", "tmoney"][..]),
            factory_for_type("tmoney").map(|factory| factory.type_names)
        );
        assert!(factory_for_type("emv-main").is_some());
        assert!(factory_for_type("cepas").is_none());
    }
}
