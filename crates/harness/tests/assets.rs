use draftwork_core::{AssetMetadata, FieldValue};
use draftwork_engine::{AssetOverlay, EngineError, ItemState, Overlay};
use draftwork_harness::{Fault, Faulty, Texture, sample_assets, sample_texture};

#[test]
fn payload_properties_are_tracked() -> Result<(), Box<dyn std::error::Error>> {
    let (repo, assets) = sample_assets()?;
    let grass = assets[0].id;
    let mut o = AssetOverlay::new(repo)?;

    assert!(o.track_property_change(&grass, "width", 128i64.into())?);
    assert_eq!(o.item_state(&grass), ItemState::Modified);
    assert_eq!(o.payload(&grass)?.width, 128);
    assert_eq!(
        o.property_baseline_value(&grass, "width"),
        Some(FieldValue::Integer(64))
    );
    assert_eq!(o.metadata(&grass)?.name, "grass");
    assert_eq!(o.path(&grass)?, "textures/grass.png");

    assert!(!o.track_property_change(&grass, "width", 64i64.into())?);
    assert_eq!(o.item_state(&grass), ItemState::Unchanged);
    assert!(!o.has_working_copy(&grass));
    Ok(())
}

#[test]
fn create_and_save_new_asset() -> Result<(), Box<dyn std::error::Error>> {
    let (repo, _) = sample_assets()?;
    let mut o = AssetOverlay::new(repo)?;

    let id = o.create(AssetMetadata::named("sand"), "textures/sand.png", Texture::new(32, 32))?;
    assert_eq!(o.item_state(&id), ItemState::Added);
    assert_eq!(o.count(), 3);
    assert_eq!(o.find_by_path("textures/sand.png"), Some(id));

    o.track_property_change(&id, "format", "bc7".into())?;
    o.save()?;

    let persisted = o.repository().persisted(&id)?.ok_or("sand missing")?;
    assert_eq!(persisted.payload.format, "bc7");
    assert_eq!(persisted.path, "textures/sand.png");
    assert_eq!(o.repository().persisted_len(), 3);
    assert!(!o.has_modifications());
    Ok(())
}

#[test]
fn add_rejects_mismatched_id_and_taken_path() -> Result<(), Box<dyn std::error::Error>> {
    let (repo, assets) = sample_assets()?;
    let mut o = AssetOverlay::new(repo)?;

    let entry = sample_texture("dirt", "textures/dirt.png");
    assert!(matches!(
        o.add(assets[0].id, entry),
        Err(EngineError::InvalidOperation(_))
    ));

    let clash = sample_texture("grass copy", "textures/grass.png");
    assert!(matches!(
        o.add(clash.id, clash.clone()),
        Err(EngineError::AlreadyExists(_))
    ));
    assert!(!o.has_modifications());
    Ok(())
}

#[test]
fn deleted_path_can_be_reused() -> Result<(), Box<dyn std::error::Error>> {
    let (repo, assets) = sample_assets()?;
    let mut o = AssetOverlay::new(repo)?;

    o.delete(&assets[1].id)?;
    assert_eq!(o.find_by_path("textures/stone.png"), None);
    let replacement = sample_texture("new stone", "textures/stone.png");
    let id = replacement.id;
    o.add(id, replacement)?;

    o.save()?;
    assert!(o.repository().persisted(&assets[1].id)?.is_none());
    assert!(o.repository().persisted(&id)?.is_some());
    Ok(())
}

#[test]
fn restored_asset_keeps_identity() -> Result<(), Box<dyn std::error::Error>> {
    let (repo, assets) = sample_assets()?;
    let grass = assets[0].id;
    let mut o = AssetOverlay::new(repo)?;

    o.delete(&grass)?;
    let mut again = sample_texture("renamed", "elsewhere/grass.png");
    again.id = grass;
    again.payload.height = 16;
    o.add(grass, again)?;

    assert_eq!(o.item_state(&grass), ItemState::Modified);
    assert_eq!(o.metadata(&grass)?.name, "grass");
    assert_eq!(o.path(&grass)?, "textures/grass.png");
    assert_eq!(o.payload(&grass)?.height, 16);
    assert_eq!(o.modified_properties(&grass), vec!["height".to_string()]);
    Ok(())
}

#[test]
fn item_key_uses_asset_identity() -> Result<(), Box<dyn std::error::Error>> {
    let (repo, assets) = sample_assets()?;
    let o = AssetOverlay::new(repo)?;

    assert_eq!(o.item_key(&assets[1]), Some(assets[1].id));
    assert_eq!(o.item_key(&sample_texture("x", "x.png")), None);
    Ok(())
}

#[test]
fn failed_add_is_retried_without_duplicates() -> Result<(), Box<dyn std::error::Error>> {
    let (repo, assets) = sample_assets()?;
    let repo = Faulty::new(repo);
    let switch = repo.switch();
    let mut o = AssetOverlay::new(repo)?;

    o.delete(&assets[0].id)?;
    let id = o.create(AssetMetadata::named("mud"), "textures/mud.png", Texture::new(8, 8))?;

    switch.arm(Fault::Save);
    assert!(o.save().is_err());
    assert_eq!(o.item_state(&id), ItemState::Added);
    assert_eq!(o.repository().inner().persisted_len(), 2);

    switch.heal();
    o.save()?;
    let repo = o.repository().inner();
    assert_eq!(repo.persisted_len(), 2);
    assert!(repo.persisted(&assets[0].id)?.is_none());
    assert!(repo.persisted(&id)?.is_some());
    Ok(())
}
