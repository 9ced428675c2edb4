use super::{Entity, EntityRef, Fields};
use crate::core::{PersistError, Result};
use crate::storage::{Filter, Query, SortDirection};
use crate::transaction::Session;
use chrono::Utc;
use uuid::Uuid;

/// Session-level entity operations. They run inside the caller's scope, so a
/// domain service can compose several of them into one transaction.
impl Session {
    /// Builds a new entity from `fields` (fresh UUID, version 1) and inserts it.
    pub async fn create_entity<T: Entity>(&self, fields: Fields) -> Result<T> {
        let entity = new_entity::<T>(fields)?;
        self.insert_entity(&entity).await?;
        Ok(entity)
    }

    pub async fn insert_entity<T: Entity>(&self, entity: &T) -> Result<()> {
        self.insert(T::schema().table(), entity.to_row()).await
    }

    pub async fn find_entity<T: Entity>(&self, id: &str) -> Result<Option<T>> {
        let schema = T::schema();
        self.find_one_by::<T>(&[Filter::eq(schema.primary_key(), id)])
            .await
    }

    /// Like [`Session::find_entity`], failing with `NotFound` when absent.
    pub async fn read_entity<T: Entity>(&self, id: &str) -> Result<T> {
        let schema = T::schema();
        self.find_entity::<T>(id)
            .await?
            .ok_or_else(|| PersistError::NotFound {
                entity: schema.entity(),
                key: schema.primary_key(),
                id: id.to_string(),
            })
    }

    pub async fn find_one_by<T: Entity>(&self, filters: &[Filter]) -> Result<Option<T>> {
        let query = Query::new().filters(filters.iter().cloned()).limit(1);
        let mut found = self.find_entities::<T>(&query).await?;
        Ok(found.pop())
    }

    /// Entities matching `query`; ordered by primary key unless the query
    /// names an order.
    pub async fn find_entities<T: Entity>(&self, query: &Query) -> Result<Vec<T>> {
        let schema = T::schema();
        schema.check_filters(&query.filters)?;

        let rows = if query.order_by.is_some() {
            self.select(schema.table(), query).await?
        } else {
            let ordered = query
                .clone()
                .order_by(schema.primary_key(), SortDirection::Asc);
            self.select(schema.table(), &ordered).await?
        };
        rows.iter().map(T::from_row).collect()
    }

    pub async fn count_entities<T: Entity>(&self, filters: &[Filter]) -> Result<u64> {
        let schema = T::schema();
        schema.check_filters(filters)?;
        self.count(schema.table(), filters).await
    }

    /// Applies `fields` to the stored entity under a row lock on
    /// `(id, expected version)`.
    ///
    /// With an entity, the expected version is the one it carries. With an id,
    /// the current version is read first, so a retried scope re-applies the
    /// change to whatever is stored by then.
    pub async fn update_entity<T: Entity>(&self, target: &EntityRef<T>, fields: &Fields) -> Result<T> {
        let schema = T::schema();
        schema.check_fields(fields, false)?;

        let (id, expected) = match target {
            EntityRef::Entity(entity) => (entity.id().to_string(), entity.version()),
            EntityRef::Id(id) => {
                let current = self.read_entity::<T>(id).await?;
                (id.clone(), current.version())
            }
        };

        let locked = self
            .select_for_update(
                schema.table(),
                &[
                    Filter::eq(schema.primary_key(), id.as_str()),
                    Filter::eq(schema.version_column(), expected),
                ],
            )
            .await?;
        let Some(row) = locked.first() else {
            return Err(PersistError::conflict(format!(
                "{} {} was modified by another process (expected version {})",
                schema.entity(),
                id,
                expected
            )));
        };

        let mut entity = T::from_row(row)?;
        schema.apply(&mut entity, fields.clone())?;
        entity.set_version(expected + 1);
        entity.touch(Utc::now());

        if self.update(schema.table(), &id, entity.to_row()).await? == 0 {
            return Err(PersistError::conflict(format!(
                "{} {} was removed by another process",
                schema.entity(),
                id
            )));
        }
        Ok(entity)
    }

    /// Removes the entity after re-reading it under a row lock.
    pub async fn delete_entity<T: Entity>(&self, target: &EntityRef<T>) -> Result<()> {
        let schema = T::schema();
        let id = target.id();

        let locked = self
            .select_for_update(schema.table(), &[Filter::eq(schema.primary_key(), id)])
            .await?;
        if locked.is_empty() || self.delete(schema.table(), id).await? == 0 {
            return Err(PersistError::conflict(format!(
                "{} {} was removed by another process",
                schema.entity(),
                id
            )));
        }
        Ok(())
    }
}

/// Validates `fields` for creation and builds the entity with a fresh id.
pub(crate) fn new_entity<T: Entity>(fields: Fields) -> Result<T> {
    let schema = T::schema();
    schema.check_fields(&fields, true)?;

    let mut entity = T::blank(Uuid::new_v4().to_string());
    schema.apply(&mut entity, fields)?;
    Ok(entity)
}
