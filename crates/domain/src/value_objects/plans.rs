use crate::value_objects::enums::{billing_cadences::BillingCadence, plan_ids::PlanId};

/// Billing parameters and role mapping for one plan. Immutable after startup.
#[derive(Debug, Clone)]
pub struct PlanDefinition {
    pub id: PlanId,
    pub display_name: &'static str,
    pub cadence: BillingCadence,
    /// Price in minor units; free has none.
    pub price_minor: Option<i32>,
    pub currency: &'static str,
    /// Checkout mode used by the billing provider ("subscription" or "payment").
    pub checkout_mode: Option<&'static str>,
    /// External role granted to holders of this plan, when one is configured.
    pub role_id: Option<String>,
}

/// Role ids mapped to each paid plan, as loaded from configuration.
/// A missing entry means no role projection for that plan.
#[derive(Debug, Clone, Default)]
pub struct PlanRoleMap {
    pub monthly: Option<String>,
    pub annual: Option<String>,
    pub lifetime: Option<String>,
}

/// Static plan table, ordered by ascending rank.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<PlanDefinition>,
}

impl PlanCatalog {
    pub fn new(roles: PlanRoleMap) -> Self {
        let plans = vec![
            PlanDefinition {
                id: PlanId::Free,
                display_name: "Free",
                cadence: BillingCadence::None,
                price_minor: None,
                currency: "eur",
                checkout_mode: None,
                role_id: None,
            },
            PlanDefinition {
                id: PlanId::Monthly,
                display_name: "Clarivex Monthly Subscription",
                cadence: BillingCadence::Monthly,
                price_minor: Some(399),
                currency: "eur",
                checkout_mode: Some("subscription"),
                role_id: roles.monthly,
            },
            PlanDefinition {
                id: PlanId::Annual,
                display_name: "Clarivex Annual Subscription",
                cadence: BillingCadence::Annual,
                price_minor: Some(2999),
                currency: "eur",
                checkout_mode: Some("subscription"),
                role_id: roles.annual,
            },
            PlanDefinition {
                id: PlanId::Lifetime,
                display_name: "Clarivex Lifetime Access",
                cadence: BillingCadence::None,
                price_minor: Some(3499),
                currency: "eur",
                checkout_mode: Some("payment"),
                role_id: roles.lifetime,
            },
        ];

        Self { plans }
    }

    pub fn get(&self, plan: PlanId) -> &PlanDefinition {
        // Constructed in rank order, one entry per id.
        &self.plans[plan.rank() as usize]
    }

    pub fn role_id(&self, plan: PlanId) -> Option<&str> {
        self.get(plan).role_id.as_deref()
    }

    pub fn plan_for_role(&self, role_id: &str) -> Option<PlanId> {
        self.plans
            .iter()
            .find(|def| def.role_id.as_deref() == Some(role_id))
            .map(|def| def.id)
    }

    /// Highest-ranked plan whose mapped role appears in `role_ids`, free when none match.
    pub fn highest_plan_for_roles(&self, role_ids: &[String]) -> PlanId {
        self.plans
            .iter()
            .rev()
            .find(|def| {
                def.role_id
                    .as_deref()
                    .is_some_and(|role| role_ids.iter().any(|held| held == role))
            })
            .map(|def| def.id)
            .unwrap_or(PlanId::Free)
    }

    pub fn plans(&self) -> &[PlanDefinition] {
        &self.plans
    }
}
