//! Context rule matching.
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{
    context::ContextValue,
    flag::{Operand, Value},
    EvaluationContext,
};

/// Targeting rule for one context field: every configured operator must hold.
///
/// On the wire this is an object keyed by operator name, e.g. `{"gte": 18, "lt": 65}`. A `null`
/// operand is accepted and never satisfied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextRule(pub BTreeMap<Operator, Option<Operand>>);

impl ContextRule {
    /// Return `true` if `value` satisfies every operator of the rule. A rule with no operators
    /// never matches.
    pub fn matches(&self, value: &ContextValue) -> bool {
        !self.0.is_empty()
            && self.0.iter().all(|(operator, operand)| {
                operand
                    .as_ref()
                    .is_some_and(|operand| operator.eval(value, operand))
            })
    }
}

impl<const N: usize> From<[(Operator, Operand); N]> for ContextRule {
    fn from(value: [(Operator, Operand); N]) -> Self {
        ContextRule(
            value
                .into_iter()
                .map(|(operator, operand)| (operator, Some(operand)))
                .collect(),
        )
    }
}

/// Return `true` if every field referenced by `rules` is present in `context` and satisfies its
/// rule. Empty `rules` always match.
pub fn context_rules_match(
    rules: &HashMap<String, ContextRule>,
    context: &EvaluationContext,
) -> bool {
    rules.iter().all(|(field, rule)| {
        context
            .get(field)
            .is_some_and(|value| rule.matches(value))
    })
}

/// Comparison applied between a context value and a rule operand.
///
/// `eq` and `neq` take a single operand, `oneOf` and `notOneOf` take a list. The ordering
/// operators only compare numbers with numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    OneOf,
    NotOneOf,
}

impl Operator {
    /// Applying `Operator` to the values. Returns `false` if the operator cannot be applied,
    /// including any type mismatch between `value` and `operand`.
    pub fn eval(&self, value: &ContextValue, operand: &Operand) -> bool {
        self.try_eval(value, operand).unwrap_or(false)
    }

    /// Try applying `Operator` to the values, returning `None` if the operator cannot be applied.
    fn try_eval(&self, value: &ContextValue, operand: &Operand) -> Option<bool> {
        match self {
            Self::Eq | Self::Neq => {
                let operand = match operand {
                    Operand::Single(v) => v,
                    Operand::Multiple(_) => return None,
                };
                let equal = scalar_eq(value, operand)?;
                Some(if *self == Self::Eq { equal } else { !equal })
            }

            Self::OneOf | Self::NotOneOf => {
                let values = match operand {
                    Operand::Multiple(v) => v,
                    Operand::Single(_) => return None,
                };
                // Elements of another type cannot match, but they do not poison the list.
                let is_one_of = values
                    .iter()
                    .any(|v| scalar_eq(value, v).unwrap_or(false));
                let has_comparable = values.iter().any(|v| scalar_eq(value, v).is_some());
                if *self == Self::NotOneOf && !has_comparable && !values.is_empty() {
                    return None;
                }
                Some(if *self == Self::OneOf {
                    is_one_of
                } else {
                    !is_one_of
                })
            }

            Self::Gt | Self::Gte | Self::Lt | Self::Lte => {
                let value = value.as_number()?;
                let operand = match operand {
                    Operand::Single(Value::Number(n)) => *n,
                    _ => return None,
                };
                Some(match self {
                    Self::Gt => value > operand,
                    Self::Gte => value >= operand,
                    Self::Lt => value < operand,
                    Self::Lte => value <= operand,
                    _ => {
                        // unreachable
                        return None;
                    }
                })
            }
        }
    }
}

/// Same-type equality. `None` on type mismatch.
fn scalar_eq(value: &ContextValue, operand: &Value) -> Option<bool> {
    match (value, operand) {
        (ContextValue::String(a), Value::String(b)) => Some(a == b),
        (ContextValue::Number(a), Value::Number(b)) => Some(a == b),
        (ContextValue::Boolean(a), Value::Boolean(b)) => Some(a == b),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::{
        context::ContextValue,
        flag::{Operand, Value},
    };

    use super::{context_rules_match, ContextRule, Operator};

    fn list(values: &[&str]) -> Operand {
        values.iter().map(|v| Value::from(*v)).collect::<Vec<_>>().into()
    }

    #[test]
    fn eq() {
        assert!(Operator::Eq.eval(&"US".into(), &"US".into()));
        assert!(!Operator::Eq.eval(&"EU".into(), &"US".into()));
        assert!(Operator::Eq.eval(&42.0.into(), &42.0.into()));
        assert!(Operator::Eq.eval(&true.into(), &true.into()));
    }

    #[test]
    fn eq_type_mismatch() {
        assert!(!Operator::Eq.eval(&"42".into(), &42.0.into()));
        assert!(!Operator::Eq.eval(&true.into(), &"true".into()));
    }

    #[test]
    fn neq() {
        assert!(Operator::Neq.eval(&"EU".into(), &"US".into()));
        assert!(!Operator::Neq.eval(&"US".into(), &"US".into()));
        // type mismatch never matches, not even for negated operators
        assert!(!Operator::Neq.eval(&"42".into(), &42.0.into()));
    }

    #[test]
    fn eq_with_array_operand() {
        assert!(!Operator::Eq.eval(&"US".into(), &list(&["US"])));
        assert!(!Operator::Neq.eval(&"US".into(), &list(&["EU"])));
    }

    #[test]
    fn gt_gte_lt_lte() {
        assert!(Operator::Gt.eval(&19.0.into(), &18.0.into()));
        assert!(!Operator::Gt.eval(&18.0.into(), &18.0.into()));
        assert!(Operator::Gte.eval(&18.0.into(), &18.0.into()));
        assert!(!Operator::Gte.eval(&17.0.into(), &18.0.into()));
        assert!(Operator::Lt.eval(&17.0.into(), &18.0.into()));
        assert!(!Operator::Lt.eval(&18.0.into(), &18.0.into()));
        assert!(Operator::Lte.eval(&18.0.into(), &18.0.into()));
        assert!(!Operator::Lte.eval(&19.0.into(), &18.0.into()));
    }

    #[test]
    fn comparison_of_non_numbers_is_non_matching() {
        assert!(!Operator::Gt.eval(&"19".into(), &18.0.into()));
        assert!(!Operator::Gt.eval(&19.0.into(), &"18".into()));
        assert!(!Operator::Lt.eval(&true.into(), &18.0.into()));
        assert!(!Operator::Gte.eval(&18.0.into(), &vec![18.0].into()));
    }

    #[test]
    fn one_of() {
        assert!(Operator::OneOf.eval(&"US".into(), &list(&["US", "EU"])));
        assert!(Operator::OneOf.eval(&"EU".into(), &list(&["US", "EU"])));
        assert!(!Operator::OneOf.eval(&"CN".into(), &list(&["US", "EU"])));
        assert!(!Operator::OneOf.eval(&"US".into(), &list(&[])));
    }

    #[test]
    fn one_of_mixed_types() {
        let operand: Operand = vec![Value::from(1.0), Value::from("2"), Value::from(true)].into();
        assert!(Operator::OneOf.eval(&1.0.into(), &operand));
        assert!(Operator::OneOf.eval(&"2".into(), &operand));
        assert!(Operator::OneOf.eval(&true.into(), &operand));
        assert!(!Operator::OneOf.eval(&2.0.into(), &operand));
    }

    #[test]
    fn not_one_of() {
        assert!(!Operator::NotOneOf.eval(&"US".into(), &list(&["US", "EU"])));
        assert!(Operator::NotOneOf.eval(&"CN".into(), &list(&["US", "EU"])));
        assert!(Operator::NotOneOf.eval(&"CN".into(), &list(&[])));
        // nothing in the list has the value's type
        assert!(!Operator::NotOneOf.eval(&1.0.into(), &list(&["US", "EU"])));
    }

    #[test]
    fn one_of_with_scalar_operand() {
        assert!(!Operator::OneOf.eval(&"US".into(), &"US".into()));
        assert!(!Operator::NotOneOf.eval(&"CN".into(), &"US".into()));
    }

    #[test]
    fn empty_rule_never_matches() {
        let rule = ContextRule::default();
        assert!(!rule.matches(&"anything".into()));
    }

    #[test]
    fn rule_is_a_conjunction_of_operators() {
        let rule = ContextRule::from([
            (Operator::Gte, Operand::from(18.0)),
            (Operator::Lt, Operand::from(65.0)),
        ]);
        assert!(rule.matches(&18.0.into()));
        assert!(rule.matches(&64.0.into()));
        assert!(!rule.matches(&17.0.into()));
        assert!(!rule.matches(&65.0.into()));
    }

    #[test]
    fn parse_rule_from_json() {
        let rule: ContextRule =
            serde_json::from_str(r#"{"oneOf": ["US", "EU"], "neq": "DE"}"#).unwrap();
        assert_eq!(rule.0.len(), 2);
        assert_eq!(rule.0[&Operator::OneOf], Some(list(&["US", "EU"])));
        assert_eq!(rule.0[&Operator::Neq], Some(Operand::Single(Value::from("DE"))));

        assert!(serde_json::from_str::<ContextRule>(r#"{"contains": "x"}"#).is_err());
    }

    #[test]
    fn null_operand_never_matches() {
        let rule: ContextRule = serde_json::from_str(r#"{"eq": null}"#).unwrap();
        assert_eq!(rule.0[&Operator::Eq], None);
        assert!(!rule.matches(&"pro".into()));
        assert!(!rule.matches(&0.0.into()));

        // one null operand fails the whole rule
        let rule: ContextRule = serde_json::from_str(r#"{"gte": 18, "lt": null}"#).unwrap();
        assert!(!rule.matches(&30.0.into()));
    }

    #[test]
    fn all_fields_must_be_present_and_match() {
        let rules = HashMap::from([
            (
                "location".to_owned(),
                ContextRule::from([(Operator::OneOf, list(&["US", "EU"]))]),
            ),
            (
                "age".to_owned(),
                ContextRule::from([(Operator::Gte, Operand::from(18.0))]),
            ),
        ]);

        let matching = HashMap::from([
            ("location".to_owned(), ContextValue::from("US")),
            ("age".to_owned(), ContextValue::from(30)),
        ]);
        assert!(context_rules_match(&rules, &matching));

        let missing_field = HashMap::from([("location".to_owned(), ContextValue::from("US"))]);
        assert!(!context_rules_match(&rules, &missing_field));

        let failing_operator = HashMap::from([
            ("location".to_owned(), ContextValue::from("US")),
            ("age".to_owned(), ContextValue::from(17)),
        ]);
        assert!(!context_rules_match(&rules, &failing_operator));
    }

    #[test]
    fn no_rules_always_match() {
        assert!(context_rules_match(&HashMap::new(), &HashMap::new()));
    }
}
