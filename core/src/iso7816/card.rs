use crate::ap::{cepas, ApplicationFactory};
use crate::feedback::Feedback;
use crate::info::ListItem;
use crate::iso7816::{Application, MutableCapsule, Protocol, Result};
use crate::trace::{debug, info, warning};

/// Knobs of a card scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Probes for CEPAS before selecting any application by name.
    pub probe_cepas: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self { probe_cepas: true }
    }
}

/// Everything read from a card in one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Card {
    pub applications: Vec<Application>,

    /// The card was lost or the transport failed before the scan completed.
    pub is_partial_read: bool,
}

impl Card {
    /// Scans the card, trying each factory in order.
    ///
    /// A transport failure ends the scan early; the applications read so far are kept and the
    /// card is marked as partially read.
    pub fn dump(
        protocol: &Protocol,
        factories: &[ApplicationFactory],
        feedback: &dyn Feedback,
        options: &ScanOptions,
    ) -> Self {
        let mut card = Self::default();

        feedback.update_status_text("probing");
        feedback.update_progress_bar(0, 1);

        if let Err(e) = card.scan(protocol, factories, feedback, options) {
            warning!("Scan stopped, keeping what was read: {}", e);
            card.is_partial_read = true;
        }

        info!(
            "Read {} application(s){}",
            card.applications.len(),
            if card.is_partial_read { " (partial)" } else { "" }
        );

        card
    }

    /// Only transport errors are returned.
    fn scan(
        &mut self,
        protocol: &Protocol,
        factories: &[ApplicationFactory],
        feedback: &dyn Feedback,
        options: &ScanOptions,
    ) -> Result<()> {
        if options.probe_cepas {
            if let Some(application) = cepas::dump(protocol, feedback)? {
                self.applications.push(application);
            }
        }

        for factory in factories {
            for name in factory.application_names {
                let fci = match protocol.select_by_name_or_none(name)? {
                    Some(fci) => fci,
                    None => continue,
                };

                debug!("Selected {}", hex::encode(name));

                let capsule = MutableCapsule::new(Some(name.to_vec()), Some(fci));
                let applications = match (factory.dump)(protocol, capsule, feedback) {
                    Ok(applications) => applications,
                    Err(e) if e.is_transport() => return Err(e),
                    Err(e) => {
                        debug!("Skipping {}: {}", hex::encode(name), e);
                        continue;
                    }
                };

                let found = !applications.is_empty();
                self.applications.extend(applications);

                if found && factory.stop_after_first_app {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Everything read from the card, as a display tree per application.
    pub fn raw_data(&self) -> Vec<ListItem> {
        self.applications.iter().map(Application::raw_data).collect()
    }

    /// Serial numbers and issuers exposed by the applications, if any.
    pub fn manufacturing_info(&self) -> Vec<ListItem> {
        self.applications
            .iter()
            .flat_map(Application::manufacturing_info)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::NoFeedback;
    use crate::iso7816::{ApplicationKind, Error};
    use crate::nfc;
    use crate::nfc::mock::{MapTransceiver, ScriptedTransceiver};

    fn dump_anchor(
        _protocol: &Protocol,
        capsule: MutableCapsule,
        _feedback: &dyn Feedback,
    ) -> Result<Vec<Application>> {
        Ok(vec![Application::new(capsule, ApplicationKind::EmvAnchor)])
    }

    fn dump_nothing(
        _protocol: &Protocol,
        _capsule: MutableCapsule,
        _feedback: &dyn Feedback,
    ) -> Result<Vec<Application>> {
        Ok(Vec::new())
    }

    fn dump_refused(
        _protocol: &Protocol,
        _capsule: MutableCapsule,
        _feedback: &dyn Feedback,
    ) -> Result<Vec<Application>> {
        Err(Error::SecurityStatusNotSatisfied)
    }

    fn dump_lost(
        _protocol: &Protocol,
        _capsule: MutableCapsule,
        _feedback: &dyn Feedback,
    ) -> Result<Vec<Application>> {
        Err(Error::Transceive(nfc::Error::CardLost))
    }

    const NAMES: &[&[u8]] = &[b"APP.A", b"APP.B"];

    fn factory(stop_after_first_app: bool, dump: crate::ap::DumpFn) -> ApplicationFactory {
        ApplicationFactory {
            type_names: &["test"],
            application_names: NAMES,
            stop_after_first_app,
            dump,
        }
    }

    const NO_CEPAS: ScanOptions = ScanOptions { probe_cepas: false };

    #[test]
    fn test_dump_every_name() {
        let mock = MapTransceiver::new();
        mock.on(&[0x00, 0xA4, 0x04, 0x00, 0x05], &[0x6F, 0x00, 0x90, 0x00]);

        let protocol = Protocol::new(Box::new(mock));
        let card = Card::dump(&protocol, &[factory(false, dump_anchor)], &NoFeedback, &NO_CEPAS);

        assert!(!card.is_partial_read);
        assert_eq!(2, card.applications.len());
        assert_eq!(Some(&b"APP.B"[..]), card.applications[1].app_name());
        assert_eq!(Some(&[0x6F, 0x00][..]), card.applications[1].app_fci());
    }

    #[test]
    fn test_dump_stop_after_first_app() {
        let mock = MapTransceiver::new();
        mock.on(&[0x00, 0xA4, 0x04, 0x00, 0x05], &[0x90, 0x00]);

        let protocol = Protocol::new(Box::new(mock.clone()));
        let card = Card::dump(&protocol, &[factory(true, dump_anchor)], &NoFeedback, &NO_CEPAS);

        assert_eq!(1, card.applications.len());
        assert_eq!(1, mock.sent().len());
    }

    #[test]
    fn test_dump_stop_needs_an_application() {
        let mock = MapTransceiver::new();
        mock.on(&[0x00, 0xA4, 0x04, 0x00, 0x05], &[0x90, 0x00]);

        let protocol = Protocol::new(Box::new(mock.clone()));
        let card = Card::dump(&protocol, &[factory(true, dump_nothing)], &NoFeedback, &NO_CEPAS);

        assert!(card.applications.is_empty());
        assert_eq!(2, mock.sent().len());
    }

    #[test]
    fn test_dump_skips_refused_application() {
        let mock = MapTransceiver::new();
        mock.on(&[0x00, 0xA4, 0x04, 0x00, 0x05], &[0x90, 0x00]);

        let protocol = Protocol::new(Box::new(mock));
        let factories = [factory(false, dump_refused), factory(false, dump_anchor)];
        let card = Card::dump(&protocol, &factories, &NoFeedback, &NO_CEPAS);

        assert!(!card.is_partial_read);
        assert_eq!(2, card.applications.len());
    }

    #[test]
    fn test_dump_card_lost() {
        let mock = ScriptedTransceiver::new();
        mock.respond(&[0x90, 0x00]).respond(&[0x90, 0x00]);

        let protocol = Protocol::new(Box::new(mock.clone()));
        let factories = [factory(true, dump_anchor), factory(false, dump_lost)];
        let card = Card::dump(&protocol, &factories, &NoFeedback, &NO_CEPAS);

        assert!(card.is_partial_read);
        assert_eq!(1, card.applications.len());
        assert_eq!(2, mock.sent().len());
    }

    #[test]
    fn test_dump_lost_while_selecting() {
        let mock = ScriptedTransceiver::new();
        mock.fail(nfc::Error::CardLost);

        let protocol = Protocol::new(Box::new(mock.clone()));
        let card = Card::dump(&protocol, &[factory(false, dump_anchor)], &NoFeedback, &NO_CEPAS);

        assert!(card.is_partial_read);
        assert!(card.applications.is_empty());
        assert_eq!(1, mock.sent().len());
    }

    #[test]
    fn test_dump_probes_cepas_first() {
        let mock = ScriptedTransceiver::new();

        let protocol = Protocol::new(Box::new(mock.clone()));
        let card = Card::dump(&protocol, &[], &NoFeedback, &ScanOptions::default());

        assert!(card.applications.is_empty());
        assert_eq!(
            vec![vec![0x00, 0xA4, 0x00, 0x00, 0x02, 0x40, 0x00, 0x00]],
            mock.sent()
        );
    }

    #[test]
    fn test_raw_data() {
        let card = Card {
            applications: vec![Application::new(
                MutableCapsule::new(Some(b"APP.A".to_vec()), None),
                ApplicationKind::EmvAnchor,
            )],
            is_partial_read: false,
        };

        let items = card.raw_data();
        assert_eq!(1, items.len());
        assert_eq!("Application: APP.A", items[0].title);
        assert!(card.manufacturing_info().is_empty());
    }
}
