use labeler_core::{Label, PatientRecord, QueueItem, SessionSnapshot, StudyRecord};
use labeler_workflow::WorkQueue;
use proptest::prelude::*;

const STUDIES: [(&str, &str); 7] = [
    ("P1", "S1"),
    ("P1", "S2"),
    ("P1", "S3"),
    ("P2", "S4"),
    ("P3", "S5"),
    ("P3", "S6"),
    ("P3", "S7"),
];

const PATIENTS: [&str; 3] = ["P1", "P2", "P3"];

#[derive(Debug, Clone)]
enum Op {
    Label(usize, u8),
    Revert(usize),
    Patient(usize),
    Study(usize),
    Advance(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..STUDIES.len(), 1u8..=5).prop_map(|(i, v)| Op::Label(i, v)),
        (0..STUDIES.len()).prop_map(Op::Revert),
        (0..PATIENTS.len()).prop_map(Op::Patient),
        (0..STUDIES.len()).prop_map(Op::Study),
        (0..STUDIES.len()).prop_map(Op::Advance),
    ]
}

fn snapshot(labels: &[u8]) -> SessionSnapshot {
    let patients = PATIENTS
        .iter()
        .map(|patient| PatientRecord {
            patient_name: patient.to_string(),
            dicoms: STUDIES
                .iter()
                .zip(labels)
                .filter(|((p, _), _)| p == patient)
                .map(|((_, s), l)| StudyRecord::new(*s, Label::new(*l).unwrap()))
                .collect(),
        })
        .collect();

    SessionSnapshot { patients }
}

fn apply(queue: &mut WorkQueue, op: &Op) {
    match *op {
        Op::Label(i, v) => {
            let (p, s) = STUDIES[i];
            queue.set_label(p, s, Label::new(v).unwrap()).unwrap();
        }
        Op::Revert(i) => {
            let (p, s) = STUDIES[i];
            queue.set_label(p, s, Label::UNLABELED).unwrap();
            queue.prioritize_specific_dicom(p, s);
        }
        Op::Patient(i) => {
            queue.prioritize_patient(PATIENTS[i]);
        }
        Op::Study(i) => {
            let (p, s) = STUDIES[i];
            queue.prioritize_specific_dicom(p, s);
        }
        Op::Advance(i) => {
            let (p, s) = STUDIES[i];
            let labeled = queue.store().study(p, s).unwrap().is_labeled();
            queue.advance_past(p, s, labeled);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn membership_holds_after_any_sequence(
        labels in prop::collection::vec(0u8..=5, STUDIES.len()),
        ops in prop::collection::vec(op_strategy(), 0..40),
    ) {
        let mut queue = WorkQueue::initialize(&snapshot(&labels));
        prop_assert!(queue.verify_membership().is_ok());

        for op in &ops {
            apply(&mut queue, op);
            prop_assert!(queue.verify_membership().is_ok(), "violated after {:?}", op);
        }

        let unlabeled = queue.store().total_studies() - queue.store().labeled_count();
        prop_assert_eq!(queue.total_unlabeled_count(), unlabeled);
    }

    #[test]
    fn prioritize_patient_preserves_relative_order(
        labels in prop::collection::vec(0u8..=5, STUDIES.len()),
        patient in 0..PATIENTS.len(),
    ) {
        let mut queue = WorkQueue::initialize(&snapshot(&labels));
        let before: Vec<QueueItem> = queue.iter().cloned().collect();
        let target = PATIENTS[patient];

        queue.prioritize_patient(target);
        let after: Vec<QueueItem> = queue.iter().cloned().collect();

        let moved = before.iter().filter(|i| i.patient_id == target).count();
        let expected_front: Vec<&QueueItem> = before.iter().filter(|i| i.patient_id == target).collect();
        let expected_rest: Vec<&QueueItem> = before.iter().filter(|i| i.patient_id != target).collect();

        prop_assert_eq!(after.iter().take(moved).collect::<Vec<_>>(), expected_front);
        prop_assert_eq!(after.iter().skip(moved).collect::<Vec<_>>(), expected_rest);
    }
}
