use super::crud::new_entity;
use super::{Entity, EntityRef, Fields};
use crate::core::Result;
use crate::storage::{Filter, Query};
use crate::transaction::{ScopeOptions, TransactionManager};
use std::marker::PhantomData;
use std::sync::Arc;

const DEFAULT_PAGE_SIZE: i64 = 10;

/// Offset and limit for a page request, or `None` when neither parameter was
/// given and the whole result is wanted. Pages below 1 become 1, sizes below
/// 1 become 10.
pub fn page_window(page: Option<i64>, page_size: Option<i64>) -> Option<(usize, usize)> {
    if page.is_none() && page_size.is_none() {
        return None;
    }

    let page = page.filter(|page| *page >= 1).unwrap_or(1);
    let size = page_size
        .filter(|size| *size >= 1)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = (page - 1).saturating_mul(size);

    Some((
        usize::try_from(offset).unwrap_or(usize::MAX),
        usize::try_from(size).unwrap_or(usize::MAX),
    ))
}

/// One transaction scope per operation for entity type `T`.
pub struct Repository<T> {
    manager: Arc<TransactionManager>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Repository<T> {
    pub fn new(manager: Arc<TransactionManager>) -> Self {
        Self {
            manager,
            _entity: PhantomData,
        }
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Validates `fields` before any scope opens, then inserts at repeatable
    /// read.
    pub async fn create(&self, fields: Fields) -> Result<T> {
        let entity = new_entity::<T>(fields)?;
        self.manager
            .run(ScopeOptions::repeatable_read(), |session| {
                let entity = entity.clone();
                async move {
                    session.insert_entity(&entity).await?;
                    Ok(entity)
                }
            })
            .await
    }

    pub async fn read_by_id(&self, id: &str) -> Result<T> {
        self.manager
            .run(ScopeOptions::read_committed().retries(1), |session| {
                let id = id.to_string();
                async move { session.read_entity::<T>(&id).await }
            })
            .await
    }

    pub async fn find_one_by(&self, filters: Vec<Filter>) -> Result<Option<T>> {
        T::schema().check_filters(&filters)?;
        self.manager
            .run(ScopeOptions::read_committed().retries(1), |session| {
                let filters = filters.clone();
                async move { session.find_one_by::<T>(&filters).await }
            })
            .await
    }

    /// Page of entities matching `filters` plus the total number of matches.
    pub async fn read_all(
        &self,
        page: Option<i64>,
        page_size: Option<i64>,
        filters: Vec<Filter>,
    ) -> Result<(Vec<T>, u64)> {
        T::schema().check_filters(&filters)?;

        let mut query = Query::new().filters(filters.iter().cloned());
        if let Some((offset, limit)) = page_window(page, page_size) {
            query = query.offset(offset).limit(limit);
        }

        self.manager
            .run(ScopeOptions::read_committed(), |session| {
                let query = query.clone();
                let filters = filters.clone();
                async move {
                    let items = session.find_entities::<T>(&query).await?;
                    let total = session.count_entities::<T>(&filters).await?;
                    Ok((items, total))
                }
            })
            .await
    }

    pub async fn update(&self, target: impl Into<EntityRef<T>>, fields: Fields) -> Result<T> {
        let target = target.into();
        T::schema().check_fields(&fields, false)?;

        self.manager
            .run(ScopeOptions::repeatable_read(), |session| {
                let target = target.clone();
                let fields = fields.clone();
                async move { session.update_entity(&target, &fields).await }
            })
            .await
    }

    /// An id is resolved first, so a missing entity fails with `NotFound`
    /// before the delete scope opens.
    pub async fn delete(&self, target: impl Into<EntityRef<T>>) -> Result<()> {
        let target = match target.into() {
            EntityRef::Id(id) => EntityRef::Entity(self.read_by_id(&id).await?),
            entity => entity,
        };

        self.manager
            .run(ScopeOptions::repeatable_read(), |session| {
                let target = target.clone();
                async move { session.delete_entity(&target).await }
            })
            .await
    }
}

impl<T: Entity> From<T> for EntityRef<T> {
    fn from(entity: T) -> Self {
        Self::Entity(entity)
    }
}
