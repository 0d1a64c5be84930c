use std::any::Any;

use draftwork_core::FieldValue;
use draftwork_engine::{
    AssetOverlay, CollectionOverlay, EngineError, ErasedOverlay, ItemState, LocalizationOverlay,
    Overlay, OverlayKind, SINGLETON_KEY, SingletonOverlay,
};
use draftwork_harness::{
    Item, Recorder, en, sample_assets, sample_items, sample_localization, sample_settings,
};

#[test]
fn heterogeneous_overlays_share_one_interface() -> Result<(), Box<dyn std::error::Error>> {
    let (assets, entries) = sample_assets()?;
    let mut overlays: Vec<Box<dyn ErasedOverlay>> = vec![
        Box::new(CollectionOverlay::new(sample_items()?)?),
        Box::new(SingletonOverlay::new(sample_settings()?)?),
        Box::new(AssetOverlay::new(assets)?),
        Box::new(LocalizationOverlay::open(sample_localization()?, en())?),
    ];

    let kinds: Vec<OverlayKind> = overlays.iter().map(|o| o.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            OverlayKind::Collection,
            OverlayKind::Singleton,
            OverlayKind::Asset,
            OverlayKind::Localization,
        ]
    );

    overlays[0].track_property_change(&"a".to_string(), "value", 5i64.into())?;
    overlays[1].track_property_change(&SINGLETON_KEY, "volume", 7i64.into())?;
    overlays[2].track_property_change(&entries[0].id, "width", 1i64.into())?;
    overlays[3].track_property_change(&"Hello".to_string(), "en", "Hey".into())?;
    assert!(overlays.iter().all(|o| o.has_modifications()));

    for overlay in overlays.iter_mut() {
        overlay.save()?;
    }
    assert!(overlays.iter().all(|o| !o.has_modifications()));
    Ok(())
}

#[test]
fn wrong_key_type_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let mut erased: Box<dyn ErasedOverlay> = Box::new(CollectionOverlay::new(sample_items()?)?);

    let err = erased.item_state(&42u32).unwrap_err();
    assert!(matches!(err, EngineError::KeyType { .. }));
    assert!(erased
        .track_property_change(&"a", "value", FieldValue::Integer(2))
        .is_err());
    assert!(!erased.has_modifications());
    Ok(())
}

#[test]
fn erased_calls_reach_the_typed_overlay() -> Result<(), Box<dyn std::error::Error>> {
    let mut typed = CollectionOverlay::new(sample_items()?)?;
    let recorder = Recorder::new();
    let b = "b".to_string();
    let erased: &mut dyn ErasedOverlay = &mut typed;

    erased.subscribe(Box::new(recorder.listener()));
    erased.delete(&b)?;
    assert_eq!(erased.item_state(&b)?, ItemState::Deleted);
    assert_eq!(erased.count(), 1);
    assert!(!erased.contains_key(&b)?);
    assert_eq!(
        erased.property_baseline_value(&"a".to_string(), "value")?,
        Some(FieldValue::Integer(1))
    );

    erased.revert();
    assert_eq!(recorder.events(), vec![true, false]);
    assert_eq!(Overlay::item_state(&typed, &b), ItemState::Unchanged);
    Ok(())
}

#[test]
fn item_key_round_trips_through_any() -> Result<(), Box<dyn std::error::Error>> {
    let typed = CollectionOverlay::new(sample_items()?)?;
    let item = Overlay::get(&typed, &"a".to_string())?;
    let erased: &dyn ErasedOverlay = &typed;

    let key = erased.item_key(item as &dyn Any).ok_or("no key")?;
    assert_eq!(key.downcast_ref::<String>(), Some(&"a".to_string()));
    assert!(erased.item_key(&Item::new("a", 1)).is_none());
    assert!(erased.item_key(&5u8).is_none());
    Ok(())
}

#[test]
fn items_are_added_listed_and_edited_through_any() -> Result<(), Box<dyn std::error::Error>> {
    let mut erased: Box<dyn ErasedOverlay> = Box::new(CollectionOverlay::new(sample_items()?)?);
    let c = "c".to_string();

    erased.add(Box::new(c.clone()), Box::new(Item::new("c", 3)))?;
    assert_eq!(erased.item_state(&c)?, ItemState::Added);
    let keys: Vec<&String> = erased
        .items()
        .filter_map(|(key, _)| key.downcast_ref::<String>())
        .collect();
    assert_eq!(keys, ["a", "b", "c"]);

    let fetched = erased.get(&c)?.downcast_ref::<Item>().ok_or("not an item")?;
    assert_eq!(fetched.value, 3);

    let a = "a".to_string();
    let copy = erased
        .working_copy(&a)?
        .downcast_mut::<Item>()
        .ok_or("not an item")?;
    copy.label = "edited".into();
    assert_eq!(erased.item_state(&a)?, ItemState::Unchanged);
    erased.mark_modified(&a)?;
    assert_eq!(erased.item_state(&a)?, ItemState::Modified);

    erased.revert_item(&c)?;
    assert!(!erased.contains_key(&c)?);
    Ok(())
}

#[test]
fn property_changes_and_reverts_through_any() -> Result<(), Box<dyn std::error::Error>> {
    let mut erased: Box<dyn ErasedOverlay> = Box::new(CollectionOverlay::new(sample_items()?)?);
    let a = "a".to_string();

    erased.track_property_change(&a, "value", 9i64.into())?;
    let changes = erased.changes(&a)?;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].property, "value");
    assert_eq!(changes[0].current, FieldValue::Integer(9));

    assert!(erased.revert_property(&a, "value")?);
    assert!(!erased.revert_property(&a, "value")?);
    assert!(!erased.has_modifications());
    assert!(matches!(erased.changes(&7u8), Err(EngineError::KeyType { .. })));
    Ok(())
}

#[test]
fn add_rejects_wrong_key_or_item_type() -> Result<(), Box<dyn std::error::Error>> {
    let (assets, _) = sample_assets()?;
    let mut erased: Box<dyn ErasedOverlay> = Box::new(AssetOverlay::new(assets)?);
    let mut texts: Box<dyn ErasedOverlay> =
        Box::new(LocalizationOverlay::open(sample_localization()?, en())?);

    assert!(matches!(
        erased.add(Box::new("x".to_string()), Box::new(Item::new("x", 1))),
        Err(EngineError::KeyType { .. })
    ));
    assert!(matches!(
        texts.add(Box::new("Thanks".to_string()), Box::new(5i64)),
        Err(EngineError::KeyType { .. })
    ));
    assert_eq!(texts.count(), 2);

    texts.add(Box::new("Thanks".to_string()), Box::new("Thank you".to_string()))?;
    let text = texts
        .get(&"Thanks".to_string())?
        .downcast_ref::<String>()
        .ok_or("not text")?;
    assert_eq!(text, "Thank you");
    assert!(!erased.has_modifications());
    Ok(())
}
