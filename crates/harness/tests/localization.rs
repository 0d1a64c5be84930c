use draftwork_core::FieldValue;
use draftwork_engine::{
    EngineError, ItemState, LocalizationOptions, LocalizationOverlay, Overlay, SaveScope,
};
use draftwork_harness::{Fault, Faulty, Recorder, de, en, fr, sample_localization};
use draftwork_storage::MemoryLocalization;

type Texts = LocalizationOverlay<MemoryLocalization>;

fn overlay() -> Result<Texts, Box<dyn std::error::Error>> {
    Ok(LocalizationOverlay::open(sample_localization()?, en())?)
}

// ============================================================================
// Per-language tracking
// ============================================================================

#[test]
fn edit_is_scoped_to_its_language() -> Result<(), Box<dyn std::error::Error>> {
    let mut o = overlay()?;
    assert_eq!(o.text("Hello"), Some("Hi"));

    o.load_language(&fr())?;
    assert!(o.set_text("Hello", "Bonjour", &fr())?);

    assert!(o.is_key_modified("Hello", &fr()));
    assert!(!o.is_key_modified("Hello", &en()));
    assert_eq!(o.key_state_in("Hello", &en()), ItemState::Unchanged);
    assert_eq!(o.key_state("Hello"), ItemState::Modified);
    assert_eq!(o.text("Hello"), Some("Hi"));
    assert_eq!(o.text_in("Hello", &fr())?, Some("Bonjour"));
    Ok(())
}

#[test]
fn setting_baseline_text_back_clears_modification() -> Result<(), Box<dyn std::error::Error>> {
    let mut o = overlay()?;
    let recorder = Recorder::new();
    o.subscribe(recorder.listener());

    o.set_text("Hello", "Hey", &en())?;
    assert!(!o.set_text("Hello", "Hi", &en())?);
    assert!(!o.has_modifications());
    assert_eq!(recorder.events(), vec![true, false]);
    Ok(())
}

#[test]
fn unloaded_language_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let mut o = overlay()?;
    assert!(matches!(
        o.text_in("Hello", &de()),
        Err(EngineError::LanguageNotLoaded(_))
    ));
    assert!(matches!(
        o.set_text("Hello", "Guten Tag", &de()),
        Err(EngineError::LanguageNotLoaded(_))
    ));
    assert!(matches!(
        o.set_text("Nope", "x", &en()),
        Err(EngineError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn switching_language_loads_once_and_keeps_edits() -> Result<(), Box<dyn std::error::Error>> {
    let mut o = overlay()?;
    let recorder = Recorder::new();
    o.subscribe(recorder.listener());

    o.set_text("Bye", "See ya", &en())?;
    o.switch_language(&fr())?;
    o.switch_language(&en())?;
    o.switch_language(&fr())?;

    assert_eq!(o.current_language(), &fr());
    assert_eq!(o.repository().load_count(), 2);
    assert_eq!(o.text("Bye"), Some("Au revoir"));
    assert_eq!(o.text_in("Bye", &en())?, Some("See ya"));
    assert_eq!(recorder.events(), vec![true]);
    Ok(())
}

#[test]
fn removing_text_hides_it_in_one_language() -> Result<(), Box<dyn std::error::Error>> {
    let mut o = overlay()?;
    o.load_language(&fr())?;

    assert!(o.remove_text("Bye", &fr())?);
    assert_eq!(o.text_in("Bye", &fr())?, None);
    assert_eq!(o.text_in("Bye", &en())?, Some("Goodbye"));
    assert!(o.contains_key(&"Bye".to_string()));

    o.save_scope(SaveScope::AllLanguages)?;
    assert_eq!(o.repository().persisted_text(&fr(), "Bye")?, None);
    assert_eq!(
        o.repository().persisted_text(&en(), "Bye")?.as_deref(),
        Some("Goodbye")
    );
    Ok(())
}

// ============================================================================
// Keys
// ============================================================================

#[test]
fn add_then_delete_key_is_a_no_op() -> Result<(), Box<dyn std::error::Error>> {
    let mut o = overlay()?;
    let before = o.count();

    o.add_key("Thanks")?;
    o.set_text("Thanks", "Thank you", &en())?;
    assert_eq!(o.count(), before + 1);
    assert_eq!(o.key_state("Thanks"), ItemState::Added);

    o.delete_key("Thanks")?;
    assert_eq!(o.count(), before);
    assert!(!o.has_modifications());
    assert!(matches!(o.delete_key("Thanks"), Err(EngineError::NotFound(_))));
    assert!(matches!(o.add_key("Hello"), Err(EngineError::AlreadyExists(_))));
    Ok(())
}

#[test]
fn deleted_key_is_hidden_everywhere() -> Result<(), Box<dyn std::error::Error>> {
    let mut o = overlay()?;
    o.set_text("Bye", "Later", &en())?;
    o.delete_key("Bye")?;

    assert_eq!(o.key_state("Bye"), ItemState::Deleted);
    assert_eq!(o.text("Bye"), None);
    assert!(o.keys().all(|k| k != "Bye"));
    assert!(matches!(
        o.set_text("Bye", "x", &en()),
        Err(EngineError::NotFound(_))
    ));

    o.add_key("Bye")?;
    assert_eq!(o.key_state("Bye"), ItemState::Unchanged);
    assert_eq!(o.text("Bye"), Some("Goodbye"));
    assert!(!o.has_modifications());
    Ok(())
}

#[test]
fn save_all_prunes_deleted_key_from_unloaded_languages() -> Result<(), Box<dyn std::error::Error>> {
    let mut o = overlay()?;
    o.delete_key("Bye")?;
    o.add_key("Thanks")?;
    o.set_text("Thanks", "Thank you", &en())?;
    o.save()?;

    let repo = o.repository();
    assert_eq!(repo.persisted_keys()?, vec!["Hello".to_string(), "Thanks".to_string()]);
    assert_eq!(repo.persisted_text(&de(), "Bye")?, None);
    assert_eq!(repo.persisted_text(&de(), "Hello")?.as_deref(), Some("Hallo"));
    assert_eq!(repo.persisted_text(&en(), "Thanks")?.as_deref(), Some("Thank you"));
    assert!(!o.has_modifications());
    assert_eq!(o.key_state("Thanks"), ItemState::Unchanged);
    Ok(())
}

// ============================================================================
// Save scopes
// ============================================================================

#[test]
fn current_language_save_leaves_other_languages_pending() -> Result<(), Box<dyn std::error::Error>> {
    let mut o = overlay()?;
    o.load_language(&fr())?;
    o.set_text("Hello", "Bonjour", &fr())?;
    o.set_text("Hello", "Hey", &en())?;

    o.save_scope(SaveScope::CurrentLanguage)?;

    let repo = o.repository();
    assert_eq!(repo.persisted_text(&en(), "Hello")?.as_deref(), Some("Hey"));
    assert_eq!(repo.persisted_text(&fr(), "Hello")?.as_deref(), Some("Salut"));
    assert!(!o.is_key_modified("Hello", &en()));
    assert!(o.is_key_modified("Hello", &fr()));
    assert!(o.has_modifications());
    Ok(())
}

#[test]
fn current_language_save_defers_new_keys() -> Result<(), Box<dyn std::error::Error>> {
    let mut o = overlay()?;
    o.add_key("Thanks")?;
    o.set_text("Thanks", "Thank you", &en())?;

    o.save_scope(SaveScope::CurrentLanguage)?;
    assert!(!o.repository().persisted_keys()?.contains(&"Thanks".to_string()));
    assert_eq!(o.key_state("Thanks"), ItemState::Added);
    assert_eq!(o.text("Thanks"), Some("Thank you"));

    o.save_scope(SaveScope::AllLanguages)?;
    assert_eq!(
        o.repository().persisted_text(&en(), "Thanks")?.as_deref(),
        Some("Thank you")
    );
    assert!(!o.has_modifications());
    Ok(())
}

#[test]
fn default_scope_comes_from_options() -> Result<(), Box<dyn std::error::Error>> {
    let options = LocalizationOptions {
        default_save_scope: SaveScope::CurrentLanguage,
        ..LocalizationOptions::default()
    };
    let mut o = LocalizationOverlay::with_options(sample_localization()?, en(), options)?;
    o.load_language(&fr())?;
    o.set_text("Hello", "Hey", &en())?;
    o.set_text("Hello", "Coucou", &fr())?;

    o.save()?;
    assert!(o.is_key_modified("Hello", &fr()));
    assert!(!o.is_key_modified("Hello", &en()));
    Ok(())
}

#[test]
fn failed_save_all_retries_cleanly() -> Result<(), Box<dyn std::error::Error>> {
    let repo = Faulty::new(sample_localization()?);
    let switch = repo.switch();
    let mut o = LocalizationOverlay::open(repo, en())?;

    o.delete_key("Bye")?;
    o.add_key("Thanks")?;
    o.set_text("Thanks", "Thank you", &en())?;

    switch.arm(Fault::SaveAll);
    assert!(o.save().is_err());
    assert_eq!(o.key_state("Bye"), ItemState::Deleted);
    assert_eq!(o.key_state("Thanks"), ItemState::Added);
    assert_eq!(
        o.repository().inner().persisted_keys()?,
        vec!["Hello".to_string(), "Bye".to_string()]
    );

    switch.heal();
    o.save()?;
    assert_eq!(
        o.repository().inner().persisted_keys()?,
        vec!["Hello".to_string(), "Thanks".to_string()]
    );
    assert!(!o.has_modifications());
    Ok(())
}

// ============================================================================
// Generic overlay contract
// ============================================================================

#[test]
fn language_code_is_the_property() -> Result<(), Box<dyn std::error::Error>> {
    let mut o = overlay()?;
    o.load_language(&fr())?;
    let hello = "Hello".to_string();

    assert!(o.track_property_change(&hello, "FR", "Bonjour".into())?);
    assert!(o.is_property_modified(&hello, "fr"));
    assert!(!o.is_property_modified(&hello, "en"));
    assert_eq!(
        o.property_baseline_value(&hello, "fr"),
        Some(FieldValue::Text("Salut".into()))
    );

    let changes = o.changes(&hello);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].property, "fr");
    assert_eq!(changes[0].current, FieldValue::Text("Bonjour".into()));

    assert!(o.track_property_change(&hello, "fr", FieldValue::Integer(1)).is_err());
    assert!(o.revert_property(&hello, "fr")?);
    assert!(!o.has_modifications());
    Ok(())
}

#[test]
fn working_copy_edits_current_language() -> Result<(), Box<dyn std::error::Error>> {
    let mut o = overlay()?;
    let hello = "Hello".to_string();

    o.working_copy(&hello)?.push_str(" there");
    assert_eq!(o.get(&hello)?, "Hi there");
    assert_eq!(o.item_state(&hello), ItemState::Unchanged);

    o.mark_modified(&hello);
    assert_eq!(o.item_state(&hello), ItemState::Modified);
    let items: Vec<(String, String)> = o.items().map(|(k, t)| (k.clone(), t.clone())).collect();
    assert_eq!(
        items,
        vec![
            ("Hello".to_string(), "Hi there".to_string()),
            ("Bye".to_string(), "Goodbye".to_string()),
        ]
    );

    o.save()?;
    assert_eq!(
        o.repository().persisted_text(&en(), "Hello")?.as_deref(),
        Some("Hi there")
    );
    assert!(!o.has_modifications());
    Ok(())
}

#[test]
fn working_copy_of_missing_text_registers_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let repo = MemoryLocalization::new(
        ["Hello", "Bye"],
        [
            (en(), vec![("Hello", "Hi"), ("Bye", "Goodbye")]),
            (fr(), vec![("Hello", "Salut")]),
        ],
    )?;
    let mut o = LocalizationOverlay::open(repo, fr())?;
    let recorder = Recorder::new();
    o.subscribe(recorder.listener());
    let bye = "Bye".to_string();

    assert_eq!(o.text("Bye"), None);
    assert_eq!(o.working_copy(&bye)?.as_str(), "");
    assert!(!o.has_modifications());
    assert_eq!(o.item_state(&bye), ItemState::Unchanged);
    assert!(recorder.events().is_empty());
    Ok(())
}

#[test]
fn direct_edits_notify_only_once_marked() -> Result<(), Box<dyn std::error::Error>> {
    let mut o = overlay()?;
    let recorder = Recorder::new();
    o.subscribe(recorder.listener());
    let hello = "Hello".to_string();

    o.working_copy(&hello)?.push('!');
    assert!(!o.has_modifications());
    assert!(recorder.events().is_empty());

    o.mark_modified(&hello);
    assert!(o.has_modifications());
    assert_eq!(recorder.events(), vec![true]);

    o.revert();
    assert_eq!(o.text("Hello"), Some("Hi"));
    assert_eq!(recorder.events(), vec![true, false]);
    Ok(())
}

#[test]
fn generic_add_and_revert() -> Result<(), Box<dyn std::error::Error>> {
    let mut o = overlay()?;
    let recorder = Recorder::new();
    o.subscribe(recorder.listener());

    o.add("Thanks".to_string(), "Thank you".to_string())?;
    assert_eq!(o.get(&"Thanks".to_string())?, "Thank you");
    o.mark_modified(&"Hello".to_string());
    assert_eq!(o.item_state(&"Hello".to_string()), ItemState::Modified);

    o.revert();
    assert!(!o.has_modifications());
    assert_eq!(o.count(), 2);
    assert_eq!(recorder.events(), vec![true, false]);
    Ok(())
}
