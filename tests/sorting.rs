use notekeeper::{Category, Note, SortDirection, SortKey, SortSpec, UniqueDocument};

fn sample_notes() -> Vec<Note> {
    let rows = [
        ("delta", 40, 1),
        ("Alpha", 10, 9),
        ("alpha", 10, 5),
        ("Ωmega", 30, 5),
        ("beta", 20, 7),
        ("beta", 50, 2),
    ];
    rows.iter()
        .map(|(name, created, modified)| {
            let mut note = Note::new(name);
            note.core_mut().created = *created;
            note.core_mut().modified = *modified;
            note
        })
        .collect()
}

fn key_of(note: &Note, key: SortKey) -> (String, i64) {
    match key {
        SortKey::Name => (note.name().to_string(), 0),
        SortKey::Created => (String::new(), note.created()),
        SortKey::Modified => (String::new(), note.modified()),
    }
}

#[test]
fn every_spec_sorts_a_permutation() {
    for spec in SortSpec::ALL {
        let original = sample_notes();
        let mut sorted = original.clone();
        spec.sort(&mut sorted);

        assert_eq!(sorted.len(), original.len());
        for note in &original {
            assert!(sorted.contains(note), "{} lost {}", spec, note.internal_name());
        }

        for pair in sorted.windows(2) {
            let (a, b) = (key_of(&pair[0], spec.key), key_of(&pair[1], spec.key));
            match spec.direction {
                SortDirection::Ascending => assert!(a <= b, "{} out of order", spec),
                SortDirection::Descending => assert!(a >= b, "{} out of order", spec),
            }
        }

        let mut again = sorted.clone();
        spec.sort(&mut again);
        assert_eq!(again, sorted, "{} is not idempotent", spec);
    }
}

#[test]
fn name_sort_is_ordinal() {
    let mut notes = sample_notes();
    SortSpec::new(SortKey::Name, SortDirection::Ascending).sort(&mut notes);
    let names: Vec<&str> = notes.iter().map(|n| n.name()).collect();
    assert_eq!(names, vec!["Alpha", "alpha", "beta", "beta", "delta", "Ωmega"]);
}

#[test]
fn ties_keep_prior_order() {
    let mut notes = sample_notes();
    let first_beta = notes[4].clone();
    let second_beta = notes[5].clone();

    SortSpec::new(SortKey::Name, SortDirection::Descending).sort(&mut notes);
    let betas: Vec<&Note> = notes.iter().filter(|n| n.name() == "beta").collect();
    assert_eq!(betas, vec![&first_beta, &second_beta]);
}

#[test]
fn categories_sort_like_notes() {
    let mut categories: Vec<Category> = ["b", "c", "a"].iter().map(|n| Category::new(n)).collect();
    SortSpec::from_code(0).unwrap().sort(&mut categories);
    let names: Vec<&str> = categories.iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}
