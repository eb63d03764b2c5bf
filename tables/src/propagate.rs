use crate::environment::Environment;

/// Fold `items` in order, handing each one the environment accumulated so far.
///
/// `step` returns the item's output and its contribution to later items.
pub fn map_with_env<T, U, F>(
    items: impl IntoIterator<Item = T>,
    base: &Environment,
    mut step: F,
) -> Vec<U>
where
    F: FnMut(T, &Environment) -> (U, Environment),
{
    let mut env = base.clone();
    let mut outputs = Vec::new();
    for item in items {
        let (output, contribution) = step(item, &env);
        env = env.extend(&contribution);
        outputs.push(output);
    }
    outputs
}

/// Same-type form of [`map_with_env`]: transform each item in order.
pub fn propagate<T, F>(items: &[T], base: &Environment, step: F) -> Vec<T>
where
    F: FnMut(&T, &Environment) -> (T, Environment),
{
    map_with_env(items, base, step)
}

/// The environment seen by the item at `index`: `base` plus the
/// contributions of `items[..index]`.
pub fn env_before<T, F>(items: &[T], index: usize, base: &Environment, mut contribute: F) -> Environment
where
    F: FnMut(&T, &Environment) -> Environment,
{
    items
        .iter()
        .take(index)
        .fold(base.clone(), |env, item| {
            let contribution = contribute(item, &env);
            env.extend(&contribution)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn items_see_only_earlier_contributions() {
        let names = ["a", "b", "c"];
        let seen = map_with_env(names, &Environment::new(), |name, env| {
            (env.names(), Environment::single(name, Value::Null))
        });
        assert_eq!(seen[0], Vec::<String>::new());
        assert_eq!(seen[1], vec!["a".to_string()]);
        assert_eq!(seen[2], vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn propagate_preserves_order() {
        let items = vec![1.0, 2.0, 3.0];
        let doubled = propagate(&items, &Environment::new(), |n, env| {
            let running: f64 = env
                .get("sum")
                .and_then(|v| match v {
                    Value::Number(s) => Some(*s),
                    _ => None,
                })
                .unwrap_or(0.0);
            (n * 2.0, Environment::single("sum", Value::Number(running + n)))
        });
        assert_eq!(doubled, vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn env_before_excludes_the_item_itself() {
        let items = ["a", "b", "c"];
        let env = env_before(&items, 1, &Environment::single("base", Value::Null), |name, _| {
            Environment::single(*name, Value::Bool(true))
        });
        assert!(env.contains("base"));
        assert!(env.contains("a"));
        assert!(!env.contains("b"));
        assert!(!env.contains("c"));
    }
}
