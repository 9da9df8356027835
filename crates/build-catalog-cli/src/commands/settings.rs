use build_catalog::{SettingKey, SyncSettings};

pub fn run(settings: &SyncSettings) {
    let width = SettingKey::ALL
        .iter()
        .map(|key| key.name().len())
        .max()
        .unwrap_or(0);

    for key in SettingKey::ALL {
        let (min, max) = key.bounds();
        println!(
            "{:<width$}  {:>8}  ({min}..={max})",
            key.name(),
            settings.get(key),
            width = width
        );
    }
}
