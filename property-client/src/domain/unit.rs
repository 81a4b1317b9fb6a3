use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Unit {
    pub id: Uuid,
    pub building_id: Uuid,
    pub unit_number: String,
    pub floor: i32,
    pub area_m2: f64,
    pub owner_id: Option<Uuid>,
}

/// A unit about to be inserted. Discovered units carry placeholder floor/area
/// until someone edits them.
#[derive(Debug, Clone)]
pub struct NewUnit {
    pub building_id: Uuid,
    pub unit_number: String,
    pub floor: i32,
    pub area_m2: f64,
    pub owner_id: Option<Uuid>,
}

impl NewUnit {
    pub fn discovered(building_id: Uuid, unit_number: impl Into<String>) -> Self {
        Self {
            building_id,
            unit_number: unit_number.into(),
            floor: 0,
            area_m2: 0.0,
            owner_id: None,
        }
    }

    pub fn with_owner(mut self, owner_id: Option<Uuid>) -> Self {
        self.owner_id = owner_id;
        self
    }
}
