//! Hierarchy Service - Entity-Type Façade
//!
//! This module provides the single entry point callers use for every entity
//! family:
//!
//! - Dispatch: each entity type is served by exactly one configured strategy
//! - Limits: name rules and the maximum page size come from [`OrgTreeConfig`]
//! - Mapping: results are returned as [`NodeView`], optionally with the full
//!   sub-tree of each node (`fetch_sub_entities`)
//!
//! Every listing exists in an unpaged form returning `Vec<NodeView>` and a
//! `*_page` form taking a [`PageRequest`].
//!
//! # Examples
//!
//! ```no_run
//! use orgtree_core::config::OrgTreeConfig;
//! use orgtree_core::hierarchy::CreateNode;
//! use orgtree_core::models::EntityType;
//! use orgtree_core::services::HierarchyService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = HierarchyService::open(OrgTreeConfig::default()).await?;
//!
//!     let eng = service
//!         .create(EntityType::Department, CreateNode::root("Engineering"))
//!         .await?;
//!     service
//!         .create(EntityType::Department, CreateNode::child("Platform", eng.id))
//!         .await?;
//!
//!     let tree = service.get_by_id(EntityType::Department, eng.id, true).await?;
//!     assert_eq!(tree.size(), 2);
//!     Ok(())
//! }
//! ```

use crate::config::{ConfigError, OrgTreeConfig};
use crate::db::DatabaseService;
use crate::hierarchy::{
    build_strategy, CreateNode, DeleteOutcome, HierarchyError, HierarchyStrategy, StrategyKind,
    UpdateNode,
};
use crate::models::{EntityType, Node, Page, PageRequest};
use crate::services::mapper::{build_tree, NodeView};
use std::collections::HashMap;
use std::sync::Arc;

/// Strategy instance serving each entity type
struct Dispatch {
    department: Arc<dyn HierarchyStrategy>,
    job: Arc<dyn HierarchyStrategy>,
    project: Arc<dyn HierarchyStrategy>,
    team: Arc<dyn HierarchyStrategy>,
}

impl Dispatch {
    fn get(&self, entity: EntityType) -> &Arc<dyn HierarchyStrategy> {
        match entity {
            EntityType::Department => &self.department,
            EntityType::Job => &self.job,
            EntityType::Project => &self.project,
            EntityType::Team => &self.team,
        }
    }
}

pub struct HierarchyService {
    config: OrgTreeConfig,
    db: Arc<DatabaseService>,
    dispatch: Dispatch,
}

impl HierarchyService {
    /// Build the façade over an open database
    ///
    /// Entity types configured with the same strategy share one instance.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Invalid` if `config` fails [`OrgTreeConfig::validate`]
    pub fn new(config: OrgTreeConfig, db: Arc<DatabaseService>) -> Result<Self, ConfigError> {
        config.validate()?;

        let rules = config.name_rules();
        let mut built: HashMap<StrategyKind, Arc<dyn HierarchyStrategy>> = HashMap::new();
        let mut pick = |kind: StrategyKind| {
            built
                .entry(kind)
                .or_insert_with(|| build_strategy(kind, db.clone(), rules))
                .clone()
        };

        let dispatch = Dispatch {
            department: pick(config.strategies.department),
            job: pick(config.strategies.job),
            project: pick(config.strategies.project),
            team: pick(config.strategies.team),
        };

        tracing::info!(
            "Hierarchy service ready: department={}, job={}, project={}, team={}",
            config.strategies.department,
            config.strategies.job,
            config.strategies.project,
            config.strategies.team
        );

        Ok(Self {
            config,
            db,
            dispatch,
        })
    }

    /// Validate the configuration, open its database and build the façade
    pub async fn open(config: OrgTreeConfig) -> Result<Self, HierarchyError> {
        config.validate()?;
        let db = Arc::new(DatabaseService::new(config.database_path.clone()).await?);
        Ok(Self::new(config, db)?)
    }

    pub fn config(&self) -> &OrgTreeConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    /// Strategy currently serving `entity`
    pub fn strategy_for(&self, entity: EntityType) -> &Arc<dyn HierarchyStrategy> {
        self.dispatch.get(entity)
    }

    fn check_page(&self, page: &PageRequest) -> Result<(), HierarchyError> {
        page.validate(self.config.max_page_size)?;
        Ok(())
    }

    async fn view(
        &self,
        entity: EntityType,
        node: Node,
        fetch_sub_entities: bool,
    ) -> Result<NodeView, HierarchyError> {
        if !fetch_sub_entities {
            return Ok(NodeView::from(node));
        }

        let descendants = self
            .strategy_for(entity)
            .get_descendants(entity, node.id, None)
            .await?
            .into_items();
        Ok(build_tree(node, descendants))
    }

    async fn views(
        &self,
        entity: EntityType,
        nodes: Vec<Node>,
        fetch_sub_entities: bool,
    ) -> Result<Vec<NodeView>, HierarchyError> {
        let mut views = Vec::with_capacity(nodes.len());
        for node in nodes {
            views.push(self.view(entity, node, fetch_sub_entities).await?);
        }
        Ok(views)
    }

    async fn view_page(
        &self,
        entity: EntityType,
        mut page: Page<Node>,
        fetch_sub_entities: bool,
    ) -> Result<Page<NodeView>, HierarchyError> {
        let nodes = std::mem::take(&mut page.items);
        let views = self.views(entity, nodes, fetch_sub_entities).await?;
        Ok(page.with_items(views))
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub async fn create(
        &self,
        entity: EntityType,
        command: CreateNode,
    ) -> Result<NodeView, HierarchyError> {
        let node = self.strategy_for(entity).create(entity, command).await?;
        Ok(NodeView::from(node))
    }

    pub async fn update(
        &self,
        entity: EntityType,
        id: i64,
        command: UpdateNode,
    ) -> Result<NodeView, HierarchyError> {
        let node = self.strategy_for(entity).update(entity, id, command).await?;
        Ok(NodeView::from(node))
    }

    /// Change only the name, keeping the current parent
    pub async fn rename(
        &self,
        entity: EntityType,
        id: i64,
        name: impl Into<String>,
    ) -> Result<NodeView, HierarchyError> {
        self.update(entity, id, UpdateNode::rename(name)).await
    }

    /// Re-parent a node (`None` makes it a root), keeping its name
    pub async fn move_node(
        &self,
        entity: EntityType,
        id: i64,
        new_parent_id: Option<i64>,
    ) -> Result<NodeView, HierarchyError> {
        self.update(entity, id, UpdateNode::move_to(new_parent_id)).await
    }

    pub async fn delete(
        &self,
        entity: EntityType,
        id: i64,
    ) -> Result<DeleteOutcome, HierarchyError> {
        self.strategy_for(entity).delete(entity, id).await
    }

    // ========================================================================
    // Lookups and traversals
    // ========================================================================

    pub async fn get_by_id(
        &self,
        entity: EntityType,
        id: i64,
        fetch_sub_entities: bool,
    ) -> Result<NodeView, HierarchyError> {
        let node = self.strategy_for(entity).get_by_id(entity, id).await?;
        self.view(entity, node, fetch_sub_entities).await
    }

    pub async fn get_children(
        &self,
        entity: EntityType,
        id: i64,
        fetch_sub_entities: bool,
    ) -> Result<Vec<NodeView>, HierarchyError> {
        tracing::debug!("Children of {} {}", entity, id);
        let nodes = self
            .strategy_for(entity)
            .get_children(entity, id, None)
            .await?
            .into_items();
        self.views(entity, nodes, fetch_sub_entities).await
    }

    pub async fn get_children_page(
        &self,
        entity: EntityType,
        id: i64,
        page: &PageRequest,
        fetch_sub_entities: bool,
    ) -> Result<Page<NodeView>, HierarchyError> {
        self.check_page(page)?;
        let nodes = self
            .strategy_for(entity)
            .get_children(entity, id, Some(page))
            .await?;
        self.view_page(entity, nodes, fetch_sub_entities).await
    }

    pub async fn get_descendants(
        &self,
        entity: EntityType,
        id: i64,
        fetch_sub_entities: bool,
    ) -> Result<Vec<NodeView>, HierarchyError> {
        tracing::debug!("Descendants of {} {}", entity, id);
        let nodes = self
            .strategy_for(entity)
            .get_descendants(entity, id, None)
            .await?
            .into_items();
        self.views(entity, nodes, fetch_sub_entities).await
    }

    pub async fn get_descendants_page(
        &self,
        entity: EntityType,
        id: i64,
        page: &PageRequest,
        fetch_sub_entities: bool,
    ) -> Result<Page<NodeView>, HierarchyError> {
        self.check_page(page)?;
        let nodes = self
            .strategy_for(entity)
            .get_descendants(entity, id, Some(page))
            .await?;
        self.view_page(entity, nodes, fetch_sub_entities).await
    }

    pub async fn get_ancestors(
        &self,
        entity: EntityType,
        id: i64,
        fetch_sub_entities: bool,
    ) -> Result<Vec<NodeView>, HierarchyError> {
        tracing::debug!("Ancestors of {} {}", entity, id);
        let nodes = self
            .strategy_for(entity)
            .get_ancestors(entity, id, None)
            .await?
            .into_items();
        self.views(entity, nodes, fetch_sub_entities).await
    }

    pub async fn get_ancestors_page(
        &self,
        entity: EntityType,
        id: i64,
        page: &PageRequest,
        fetch_sub_entities: bool,
    ) -> Result<Page<NodeView>, HierarchyError> {
        self.check_page(page)?;
        let nodes = self
            .strategy_for(entity)
            .get_ancestors(entity, id, Some(page))
            .await?;
        self.view_page(entity, nodes, fetch_sub_entities).await
    }

    pub async fn search_by_name(
        &self,
        entity: EntityType,
        fragment: &str,
        fetch_sub_entities: bool,
    ) -> Result<Vec<NodeView>, HierarchyError> {
        let nodes = self
            .strategy_for(entity)
            .search_by_name(entity, fragment, None)
            .await?
            .into_items();
        self.views(entity, nodes, fetch_sub_entities).await
    }

    pub async fn search_by_name_page(
        &self,
        entity: EntityType,
        fragment: &str,
        page: &PageRequest,
        fetch_sub_entities: bool,
    ) -> Result<Page<NodeView>, HierarchyError> {
        self.check_page(page)?;
        let nodes = self
            .strategy_for(entity)
            .search_by_name(entity, fragment, Some(page))
            .await?;
        self.view_page(entity, nodes, fetch_sub_entities).await
    }

    pub async fn list_roots(
        &self,
        entity: EntityType,
        fetch_sub_entities: bool,
    ) -> Result<Vec<NodeView>, HierarchyError> {
        let nodes = self
            .strategy_for(entity)
            .list_roots(entity, None)
            .await?
            .into_items();
        self.views(entity, nodes, fetch_sub_entities).await
    }

    pub async fn list_roots_page(
        &self,
        entity: EntityType,
        page: &PageRequest,
        fetch_sub_entities: bool,
    ) -> Result<Page<NodeView>, HierarchyError> {
        self.check_page(page)?;
        let nodes = self.strategy_for(entity).list_roots(entity, Some(page)).await?;
        self.view_page(entity, nodes, fetch_sub_entities).await
    }

    pub async fn list_all(
        &self,
        entity: EntityType,
        fetch_sub_entities: bool,
    ) -> Result<Vec<NodeView>, HierarchyError> {
        let nodes = self
            .strategy_for(entity)
            .list_all(entity, None)
            .await?
            .into_items();
        self.views(entity, nodes, fetch_sub_entities).await
    }

    pub async fn list_all_page(
        &self,
        entity: EntityType,
        page: &PageRequest,
        fetch_sub_entities: bool,
    ) -> Result<Page<NodeView>, HierarchyError> {
        self.check_page(page)?;
        let nodes = self.strategy_for(entity).list_all(entity, Some(page)).await?;
        self.view_page(entity, nodes, fetch_sub_entities).await
    }
}
