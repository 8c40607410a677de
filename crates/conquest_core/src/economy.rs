//! Buying, selling and converting units, items and upgrades.
//!
//! Every mutation path prices through the same helpers and returns the
//! army's new figures from [`aggregate`], so the numbers a player sees
//! after training are the numbers the resolvers will use.
//!
//! Purchases are discounted by PRICES bonus points, one percent per point.
//! Refunds are a fixed share of the undiscounted price.

use crate::army::{Army, BattleUpgradeRow, BonusType, ItemRow, ItemType, ItemUsage, Role, UnitType};
use crate::error::{EngineError, Result, ValidationError};
use crate::ruleset::Ruleset;
use crate::stats::{aggregate, PowerFigures};

/// Total cost of `quantity` units after the PRICES discount.
pub fn training_cost(
    ruleset: &Ruleset,
    unit: UnitType,
    level: u8,
    quantity: u64,
    prices_level: u8,
) -> Result<u64> {
    let stats = ruleset
        .unit(unit, level)
        .ok_or_else(|| level_error(unit.name(), level))?;
    Ok(discounted(stats.cost, quantity, prices_level))
}

/// Total cost of `quantity` items after the PRICES discount.
pub fn item_cost(
    ruleset: &Ruleset,
    item: ItemType,
    level: u8,
    quantity: u64,
    prices_level: u8,
) -> Result<u64> {
    let stats = ruleset
        .item(item, level)
        .ok_or_else(|| level_error(item.name(), level))?;
    Ok(discounted(stats.cost, quantity, prices_level))
}

/// Total cost of `quantity` battle upgrades after the PRICES discount.
pub fn upgrade_cost(
    ruleset: &Ruleset,
    role: Role,
    level: u8,
    quantity: u64,
    prices_level: u8,
) -> Result<u64> {
    let stats = ruleset
        .upgrade(role, level)
        .ok_or_else(|| level_error(role.unit_type().name(), level))?;
    Ok(discounted(stats.cost, quantity, prices_level))
}

/// Convert citizens into trained units.
///
/// # Errors
///
/// Fails without changing the army when the unit is not trainable, the
/// quantity is zero, or citizens or gold are short.
pub fn train(
    ruleset: &Ruleset,
    army: &mut Army,
    unit: UnitType,
    level: u8,
    quantity: u64,
) -> Result<PowerFigures> {
    require_quantity(quantity)?;
    require_trainable(unit)?;

    let citizens = army.quantity(UnitType::Citizen, 1);
    if citizens < quantity {
        return Err(EngineError::insufficient("citizens", quantity, citizens));
    }
    let cost = training_cost(ruleset, unit, level, quantity, army.bonus_level(BonusType::Prices))?;
    if army.gold < cost {
        return Err(EngineError::insufficient("gold", cost, army.gold));
    }

    army.gold -= cost;
    army.row_mut(UnitType::Citizen, 1).quantity -= quantity;
    let row = army.row_mut(unit, level);
    row.quantity = row.quantity.saturating_add(quantity);

    tracing::debug!(unit = unit.name(), level, quantity, cost, "trained units");
    Ok(aggregate(ruleset, army))
}

/// Convert trained units back into citizens for a partial refund.
///
/// # Errors
///
/// Fails without changing the army when the quantity is zero or the army
/// does not own that many units.
pub fn untrain(
    ruleset: &Ruleset,
    army: &mut Army,
    unit: UnitType,
    level: u8,
    quantity: u64,
) -> Result<PowerFigures> {
    require_quantity(quantity)?;
    require_trainable(unit)?;
    let owned = army.quantity(unit, level);
    if owned < quantity {
        return Err(EngineError::insufficient(
            format!("{} level {level} units", unit.name()),
            quantity,
            owned,
        ));
    }

    let full_price = training_cost(ruleset, unit, level, quantity, 0)?;
    let refund = refund(full_price, ruleset.economy.untrain_refund_pct);

    army.row_mut(unit, level).quantity -= quantity;
    let citizens = army.row_mut(UnitType::Citizen, 1);
    citizens.quantity = citizens.quantity.saturating_add(quantity);
    army.gold = army.gold.saturating_add(refund);

    tracing::debug!(unit = unit.name(), level, quantity, refund, "untrained units");
    Ok(aggregate(ruleset, army))
}

/// Buy and equip items.
///
/// Equipped items of one slot and usage never outnumber the units of the
/// matching role.
///
/// # Errors
///
/// Fails without changing the army when coverage would exceed the units
/// available or gold is short.
pub fn equip(
    ruleset: &Ruleset,
    army: &mut Army,
    item: ItemType,
    usage: ItemUsage,
    level: u8,
    quantity: u64,
) -> Result<PowerFigures> {
    require_quantity(quantity)?;
    let equipped: u64 = army
        .items
        .iter()
        .filter(|row| row.item == item && row.usage == usage)
        .map(|row| row.quantity)
        .sum();
    let wearers = army.count_of(usage.role().unit_type());
    let wanted = equipped.saturating_add(quantity);
    if wanted > wearers {
        return Err(EngineError::insufficient(
            format!("{} units to equip", usage.role().unit_type().name()),
            wanted,
            wearers,
        ));
    }

    let cost = item_cost(ruleset, item, level, quantity, army.bonus_level(BonusType::Prices))?;
    if army.gold < cost {
        return Err(EngineError::insufficient("gold", cost, army.gold));
    }

    army.gold -= cost;
    match army
        .items
        .iter_mut()
        .find(|row| row.item == item && row.usage == usage && row.level == level)
    {
        Some(row) => row.quantity += quantity,
        None => army.items.push(ItemRow::new(item, usage, level, quantity)),
    }

    tracing::debug!(item = item.name(), level, quantity, cost, "equipped items");
    Ok(aggregate(ruleset, army))
}

/// Unequip and sell items for a partial refund.
///
/// # Errors
///
/// Fails without changing the army when fewer items are equipped.
pub fn unequip(
    ruleset: &Ruleset,
    army: &mut Army,
    item: ItemType,
    usage: ItemUsage,
    level: u8,
    quantity: u64,
) -> Result<PowerFigures> {
    require_quantity(quantity)?;
    let full_price = item_cost(ruleset, item, level, quantity, 0)?;
    let Some(row) = army
        .items
        .iter_mut()
        .find(|row| row.item == item && row.usage == usage && row.level == level)
        .filter(|row| row.quantity >= quantity)
    else {
        let owned = army
            .items
            .iter()
            .find(|row| row.item == item && row.usage == usage && row.level == level)
            .map_or(0, |row| row.quantity);
        return Err(EngineError::insufficient(
            format!("{} level {level} items", item.name()),
            quantity,
            owned,
        ));
    };

    row.quantity -= quantity;
    army.items.retain(|row| row.quantity > 0);
    army.gold = army
        .gold
        .saturating_add(refund(full_price, ruleset.economy.sell_refund_pct));
    Ok(aggregate(ruleset, army))
}

/// Citizens are the pool units are trained from and untrained into.
fn require_trainable(unit: UnitType) -> Result<()> {
    if unit == UnitType::Citizen {
        return Err(ValidationError::UnknownKind {
            field: "trainable unit".to_string(),
            value: unit.name().to_string(),
        }
        .into());
    }
    Ok(())
}

/// Buy battle upgrades for veteran units of a role.
///
/// # Errors
///
/// Fails without changing the army when upgrades would outnumber the
/// role's level 2+ units or gold is short.
pub fn buy_upgrade(
    ruleset: &Ruleset,
    army: &mut Army,
    role: Role,
    level: u8,
    quantity: u64,
) -> Result<PowerFigures> {
    require_quantity(quantity)?;
    let veterans: u64 = army
        .units
        .iter()
        .filter(|row| row.unit == role.unit_type() && row.is_veteran())
        .map(|row| row.quantity)
        .sum();
    let owned: u64 = army
        .upgrades
        .iter()
        .filter(|row| row.role == role)
        .map(|row| row.quantity)
        .sum();
    let wanted = owned.saturating_add(quantity);
    if wanted > veterans {
        return Err(EngineError::insufficient(
            format!("veteran {} units", role.unit_type().name()),
            wanted,
            veterans,
        ));
    }

    let cost = upgrade_cost(ruleset, role, level, quantity, army.bonus_level(BonusType::Prices))?;
    if army.gold < cost {
        return Err(EngineError::insufficient("gold", cost, army.gold));
    }

    army.gold -= cost;
    match army
        .upgrades
        .iter_mut()
        .find(|row| row.role == role && row.level == level)
    {
        Some(row) => row.quantity += quantity,
        None => army.upgrades.push(BattleUpgradeRow::new(role, level, quantity)),
    }
    Ok(aggregate(ruleset, army))
}

fn discounted(unit_cost: u64, quantity: u64, prices_level: u8) -> u64 {
    let discount = u128::from(prices_level.min(crate::army::MAX_BONUS_LEVEL));
    let total = u128::from(unit_cost) * u128::from(quantity) * (100 - discount) / 100;
    u64::try_from(total).unwrap_or(u64::MAX)
}

fn refund(full_price: u64, pct: u32) -> u64 {
    let total = u128::from(full_price) * u128::from(pct.min(100)) / 100;
    u64::try_from(total).unwrap_or(u64::MAX)
}

fn require_quantity(quantity: u64) -> std::result::Result<(), ValidationError> {
    if quantity == 0 {
        return Err(ValidationError::MalformedQuantity {
            field: "quantity".to_string(),
            value: "0".to_string(),
        });
    }
    Ok(())
}

fn level_error(kind: &str, level: u8) -> EngineError {
    ValidationError::LevelOutOfRange {
        kind: kind.to_string(),
        level: u32::from(level),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::army::{BonusPoints, UnitRow};

    fn citizens(count: u64, gold: u64) -> Army {
        let mut army = Army::new(1);
        army.units = vec![UnitRow::new(UnitType::Citizen, 1, count)];
        army.gold = gold;
        army
    }

    #[test]
    fn test_training_cost_with_prices_discount() {
        let ruleset = Ruleset::default();
        assert_eq!(
            training_cost(&ruleset, UnitType::Offense, 1, 10, 0).unwrap(),
            15_000
        );
        assert_eq!(
            training_cost(&ruleset, UnitType::Offense, 1, 10, 20).unwrap(),
            12_000
        );
        // Discount is capped.
        assert_eq!(
            training_cost(&ruleset, UnitType::Offense, 1, 100, 200).unwrap(),
            37_500
        );
        assert!(training_cost(&ruleset, UnitType::Offense, 4, 1, 0).is_err());
    }

    #[test]
    fn test_train_converts_citizens_and_reports_power() {
        let ruleset = Ruleset::default();
        let mut army = citizens(20, 20_000);
        army.bonus_points = vec![BonusPoints::new(BonusType::Prices, 10)];
        let figures = train(&ruleset, &mut army, UnitType::Offense, 1, 10).unwrap();
        assert_eq!(army.quantity(UnitType::Citizen, 1), 10);
        assert_eq!(army.quantity(UnitType::Offense, 1), 10);
        assert_eq!(army.gold, 20_000 - 13_500);
        assert_eq!(figures, aggregate(&ruleset, &army));
        assert!(figures.offense > 0);
    }

    #[test]
    fn test_train_short_on_citizens_or_gold() {
        let ruleset = Ruleset::default();
        let mut army = citizens(5, 1_000_000);
        assert!(matches!(
            train(&ruleset, &mut army, UnitType::Defense, 1, 6),
            Err(EngineError::InsufficientResources { required: 6, available: 5, .. })
        ));
        let mut poor = citizens(5, 100);
        let before = poor.clone();
        assert!(train(&ruleset, &mut poor, UnitType::Defense, 1, 1).is_err());
        assert_eq!(poor, before);
    }

    #[test]
    fn test_untrain_refunds_share() {
        let ruleset = Ruleset::default();
        let mut army = citizens(0, 0);
        army.units.push(UnitRow::new(UnitType::Spy, 2, 4));
        untrain(&ruleset, &mut army, UnitType::Spy, 2, 4).unwrap();
        assert_eq!(army.quantity(UnitType::Spy, 2), 0);
        assert_eq!(army.quantity(UnitType::Citizen, 1), 4);
        assert_eq!(army.gold, 12_000);
    }

    #[test]
    fn test_citizens_cannot_be_untrained() {
        let ruleset = Ruleset::default();
        let mut army = citizens(50, 0);
        let before = army.clone();
        let err = untrain(&ruleset, &mut army, UnitType::Citizen, 1, 10).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::UnknownKind { .. })
        ));
        assert_eq!(army, before);
    }

    #[test]
    fn test_equip_limited_to_coverage() {
        let ruleset = Ruleset::default();
        let mut army = citizens(0, 1_000_000);
        army.units.push(UnitRow::new(UnitType::Offense, 1, 10));
        equip(&ruleset, &mut army, ItemType::Weapon, ItemUsage::Offense, 1, 6).unwrap();
        equip(&ruleset, &mut army, ItemType::Weapon, ItemUsage::Offense, 2, 4).unwrap();
        assert!(matches!(
            equip(&ruleset, &mut army, ItemType::Weapon, ItemUsage::Offense, 1, 1),
            Err(EngineError::InsufficientResources { required: 11, available: 10, .. })
        ));
        // Other slots have their own coverage.
        equip(&ruleset, &mut army, ItemType::Helm, ItemUsage::Offense, 1, 10).unwrap();
    }

    #[test]
    fn test_unequip_refunds_and_drops_empty_rows() {
        let ruleset = Ruleset::default();
        let mut army = citizens(0, 0);
        army.units.push(UnitRow::new(UnitType::Defense, 1, 5));
        army.items.push(ItemRow::new(ItemType::Shield, ItemUsage::Defense, 1, 5));
        unequip(&ruleset, &mut army, ItemType::Shield, ItemUsage::Defense, 1, 5).unwrap();
        assert!(army.items.is_empty());
        assert_eq!(army.gold, 3_000);
        assert!(unequip(&ruleset, &mut army, ItemType::Shield, ItemUsage::Defense, 1, 1).is_err());
    }

    #[test]
    fn test_upgrades_need_veterans() {
        let ruleset = Ruleset::default();
        let mut army = citizens(0, 1_000_000);
        army.units.push(UnitRow::new(UnitType::Sentry, 1, 50));
        assert!(buy_upgrade(&ruleset, &mut army, Role::Sentry, 1, 1).is_err());
        army.units.push(UnitRow::new(UnitType::Sentry, 2, 3));
        buy_upgrade(&ruleset, &mut army, Role::Sentry, 1, 3).unwrap();
        assert_eq!(army.gold, 1_000_000 - 6_000);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let ruleset = Ruleset::default();
        let mut army = citizens(10, 10_000);
        assert!(matches!(
            train(&ruleset, &mut army, UnitType::Offense, 1, 0),
            Err(EngineError::Validation(ValidationError::MalformedQuantity { .. }))
        ));
    }
}
